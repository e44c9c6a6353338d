/// Parses a season ordinal written with ideographic numerals (零 through 九,
/// 十, 百), e.g. `十三` = 13, `二十一` = 21, `一百零五` = 105. Plain ASCII
/// digits are accepted as well. Anything outside that vocabulary, or
/// malformed compounds such as `十十` or `三二`, yields `None`.
pub fn parse_ideographic(text: &str) -> Option<u32> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if text.chars().all(|ch| ch.is_ascii_digit()) {
        return text.parse().ok();
    }
    if text == "零" {
        return Some(0);
    }

    let mut total = 0u32;
    let mut pending: Option<u32> = None;
    let mut after_zero = false;
    let mut finished = false;
    let mut seen_ten = false;
    let mut seen_hundred = false;

    for ch in text.chars() {
        if finished {
            return None;
        }
        match ch {
            '零' => {
                if pending.is_some() || after_zero || total == 0 {
                    return None;
                }
                after_zero = true;
            }
            '十' => {
                if seen_ten || after_zero {
                    return None;
                }
                total += pending.take().unwrap_or(1) * 10;
                seen_ten = true;
            }
            '百' => {
                if seen_hundred || seen_ten || total > 0 {
                    return None;
                }
                total += pending.take()? * 100;
                seen_hundred = true;
            }
            _ => {
                let digit = digit_value(ch)?;
                if pending.is_some() {
                    return None;
                }
                pending = Some(digit);
                if after_zero {
                    after_zero = false;
                    finished = true;
                }
            }
        }
    }

    if after_zero {
        return None;
    }
    Some(total + pending.unwrap_or(0))
}

fn digit_value(ch: char) -> Option<u32> {
    let value = match ch {
        '一' => 1,
        '二' => 2,
        '三' => 3,
        '四' => 4,
        '五' => 5,
        '六' => 6,
        '七' => 7,
        '八' => 8,
        '九' => 9,
        _ => return None,
    };
    Some(value)
}
