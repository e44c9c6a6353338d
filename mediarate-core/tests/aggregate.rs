mod support;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use mediarate_core::record::{DualScore2Rating, DualScoreRating, SeasonedRating, SimpleRating};
use mediarate_core::{
    CancelFlag, CanonicalMedia, MediaType, NeverCancelled, Platform, PlatformSettings,
    PoolError, RatingRecord, RequestStatus, SeasonInfo, UNAVAILABLE,
};
use serde_json::json;
use support::{orchestrator, FakePage, FakeWeb};

fn inception() -> CanonicalMedia {
    CanonicalMedia::movie("Inception", "2010", 27205)
        .with_localized_title("盗梦空间")
        .with_imdb_id("tt1375666")
}

fn season(number: u32, year: &str) -> SeasonInfo {
    SeasonInfo {
        season_number: number,
        air_year: year.into(),
        episode_count: 8,
    }
}

fn search_url(platform: Platform, media_type: MediaType, query: &str) -> String {
    PlatformSettings::defaults(platform).search_url(media_type, query)
}

#[tokio::test]
async fn imdb_with_known_id_is_successful() {
    let web = FakeWeb::new();
    web.serve(
        "https://www.imdb.com/title/tt1375666/",
        FakePage::new().script(
            "aggregateRating",
            json!({"rating": "8.8", "count": "2,600,000"}),
        ),
    );
    let orchestrator = orchestrator(&web, 2);

    let results = orchestrator
        .aggregate(&inception(), &[Platform::Imdb], Arc::new(NeverCancelled))
        .await
        .unwrap();

    assert_eq!(
        results.get(&Platform::Imdb),
        Some(&RatingRecord::Simple(SimpleRating {
            rating: "8.8".into(),
            rating_count: "2600000".into(),
            status: Some(RequestStatus::Successful),
        }))
    );
    assert_eq!(web.visits(), vec!["https://www.imdb.com/title/tt1375666/".to_string()]);
    assert_eq!(web.opened.load(Ordering::SeqCst), web.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn soft_block_page_reports_rate_limit() {
    let web = FakeWeb::new();
    web.serve(
        &search_url(Platform::Douban, MediaType::Movie, "盗梦空间"),
        FakePage::new().body("检测到有异常请求从你的 IP 发出，请登录使用豆瓣"),
    );
    let orchestrator = orchestrator(&web, 1);

    let results = orchestrator
        .aggregate(&inception(), &[Platform::Douban], Arc::new(NeverCancelled))
        .await
        .unwrap();

    let record = &results[&Platform::Douban];
    assert_eq!(record.status(), Some(RequestStatus::RateLimit));
    assert!(record.field_values().iter().all(|value| *value == UNAVAILABLE));
}

#[tokio::test]
async fn unmatched_search_reports_no_found() {
    let web = FakeWeb::new();
    web.serve(
        &search_url(Platform::Letterboxd, MediaType::Movie, "Inception"),
        FakePage::new().script(
            "ul.results",
            json!([
                {"title": "Interstellar", "year": "2014", "url": "https://letterboxd.com/film/interstellar/"},
                {"title": "Tenet", "year": "2020", "url": "https://letterboxd.com/film/tenet/"}
            ]),
        ),
    );
    let orchestrator = orchestrator(&web, 1);

    let results = orchestrator
        .aggregate(&inception(), &[Platform::Letterboxd], Arc::new(NeverCancelled))
        .await
        .unwrap();

    assert_eq!(
        results[&Platform::Letterboxd].status(),
        Some(RequestStatus::NoFound)
    );
    assert_eq!(web.visits().len(), 1);
}

#[tokio::test]
async fn listed_but_unrated_is_no_rating() {
    let web = FakeWeb::new();
    web.serve(
        &search_url(Platform::Douban, MediaType::Movie, "盗梦空间"),
        FakePage::new().script(
            "item-root",
            json!([{"title": "盗梦空间 Inception (2010)", "year": "", "url": "https://movie.douban.com/subject/3541415/"}]),
        ),
    );
    web.serve(
        "https://movie.douban.com/subject/3541415",
        FakePage::new().body("尚未上映"),
    );
    let orchestrator = orchestrator(&web, 1);

    let results = orchestrator
        .aggregate(&inception(), &[Platform::Douban], Arc::new(NeverCancelled))
        .await
        .unwrap();

    assert_eq!(
        results[&Platform::Douban].status(),
        Some(RequestStatus::NoRating)
    );
}

#[tokio::test]
async fn douban_series_reads_each_matched_season() {
    let media = CanonicalMedia::tv(
        "Breaking Bad",
        "2008",
        1396,
        vec![season(1, "2008"), season(2, "2009")],
    )
    .with_localized_title("绝命毒师");
    let web = FakeWeb::new();
    web.serve(
        &search_url(Platform::Douban, MediaType::Tv, "绝命毒师"),
        FakePage::new().script(
            "item-root",
            json!([
                {"title": "绝命毒师 第二季 Breaking Bad Season 2 (2009)", "year": "", "url": "https://movie.douban.com/subject/3910254/"},
                {"title": "绝命毒师 第一季 Breaking Bad Season 1 (2008)", "year": "", "url": "https://movie.douban.com/subject/2997083/"},
                {"title": "绝命律师 第一季 Better Call Saul Season 1 (2015)", "year": "", "url": "https://movie.douban.com/subject/25800808/"}
            ]),
        ),
    );
    web.serve(
        "https://movie.douban.com/subject/2997083",
        FakePage::new()
            .text("strong.rating_num", "9.2")
            .text("span[property=\"v:votes\"]", "120512"),
    );
    web.serve(
        "https://movie.douban.com/subject/3910254",
        FakePage::new()
            .text("strong.rating_num", "9.4")
            .text("span[property=\"v:votes\"]", "98,001"),
    );
    let orchestrator = orchestrator(&web, 1);

    let results = orchestrator
        .aggregate(&media, &[Platform::Douban], Arc::new(NeverCancelled))
        .await
        .unwrap();

    let RatingRecord::SeasonedSimple(SeasonedRating { seasons, status }) = &results[&Platform::Douban]
    else {
        panic!("douban tv should be season shaped");
    };
    assert_eq!(*status, Some(RequestStatus::Successful));
    let summary: Vec<_> = seasons
        .iter()
        .map(|season| (season.season_number, season.rating.as_str(), season.rating_count.as_str()))
        .collect();
    assert_eq!(summary, vec![(1, "9.2", "120512"), (2, "9.4", "98001")]);
}

#[tokio::test]
async fn rottentomatoes_scores_render_without_toggles() {
    let web = FakeWeb::new();
    web.serve(
        &search_url(Platform::RottenTomatoes, MediaType::Movie, "Inception"),
        FakePage::new().script(
            "search-page-media-row",
            json!([
                {"title": "Inception", "year": "2010", "url": "https://www.rottentomatoes.com/m/inception"},
                {"title": "Inception: The Cobol Job", "year": "2010", "url": "https://www.rottentomatoes.com/m/inception_the_cobol_job"}
            ]),
        ),
    );
    web.serve(
        "https://www.rottentomatoes.com/m/inception",
        FakePage::new().script(
            "audienceReviews",
            json!({
                "tomatometer": "87%",
                "audience_score": "91%",
                "critics_avg": "8.1/10",
                "audience_avg": "4.5/5",
                "critics_count": "368 Reviews",
                "audience_count": "250,000+ Ratings"
            }),
        ),
    );
    let orchestrator = orchestrator(&web, 1);

    let results = orchestrator
        .aggregate(&inception(), &[Platform::RottenTomatoes], Arc::new(NeverCancelled))
        .await
        .unwrap();

    let RatingRecord::DualScore(DualScoreRating { series, seasons, status }) =
        &results[&Platform::RottenTomatoes]
    else {
        panic!("rottentomatoes should be dual-score shaped");
    };
    assert_eq!(*status, Some(RequestStatus::Successful));
    assert_eq!(series.tomatometer, "87%");
    assert_eq!(series.audience_count, "250000");
    assert!(seasons.is_empty());
}

#[tokio::test]
async fn metacritic_series_requires_every_season() {
    let media = CanonicalMedia::tv(
        "The Bear",
        "2022",
        136315,
        vec![season(1, "2022"), season(2, "2023")],
    );
    let scores = |metascore: &str, userscore: &str| {
        json!({
            "metascore": metascore,
            "critics_count": "Based on 20 Critic Reviews",
            "userscore": userscore,
            "users_count": "Based on 500 User Ratings"
        })
    };
    let web = FakeWeb::new();
    web.serve(
        &search_url(Platform::Metacritic, MediaType::Tv, "The Bear"),
        FakePage::new().script(
            "search-result-item",
            json!([{"title": "The Bear", "year": "2022", "url": "https://www.metacritic.com/tv/the-bear/"}]),
        ),
    );
    web.serve(
        "https://www.metacritic.com/tv/the-bear",
        FakePage::new().script("critic-score-info", scores("89", "7.9")),
    );
    web.serve(
        "https://www.metacritic.com/tv/the-bear/season-1/",
        FakePage::new().script("critic-score-info", scores("87", "8.0")),
    );
    web.serve(
        "https://www.metacritic.com/tv/the-bear/season-2/",
        FakePage::new().script("critic-score-info", scores("92", "tbd")),
    );
    let orchestrator = orchestrator(&web, 1);

    let results = orchestrator
        .aggregate(&media, &[Platform::Metacritic], Arc::new(NeverCancelled))
        .await
        .unwrap();

    let RatingRecord::DualScore2(DualScore2Rating { overall, seasons, status }) =
        &results[&Platform::Metacritic]
    else {
        panic!("metacritic should be dual-score-2 shaped");
    };
    assert_eq!(overall.status, Some(RequestStatus::Successful));
    assert_eq!(seasons[0].status, Some(RequestStatus::Successful));
    assert_eq!(seasons[1].userscore, UNAVAILABLE);
    assert_eq!(seasons[1].status, Some(RequestStatus::FetchFailed));
    assert_eq!(*status, Some(RequestStatus::FetchFailed));
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_every_platform() {
    let web = FakeWeb::new();
    web.slow_everywhere(Duration::from_secs(30));
    let orchestrator = orchestrator(&web, 5);
    let media = CanonicalMedia::movie("Heat", "1995", 949).with_localized_title("盗火线");
    let flag = CancelFlag::new();

    let trigger = flag.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(250)).await;
        trigger.cancel();
    });
    let started = tokio::time::Instant::now();
    let results = orchestrator
        .aggregate(&media, &Platform::ALL, Arc::new(flag))
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(results.len(), 5);
    for (platform, record) in &results {
        assert_eq!(
            record.status(),
            Some(RequestStatus::Cancelled),
            "{platform} was not cancelled"
        );
    }
    assert_eq!(web.opened.load(Ordering::SeqCst), web.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn cancelled_before_start_never_navigates() {
    let web = FakeWeb::new();
    let orchestrator = orchestrator(&web, 2);
    let flag = CancelFlag::new();
    flag.cancel();

    let results = orchestrator
        .aggregate(&inception(), &[Platform::Imdb, Platform::Metacritic], Arc::new(flag))
        .await
        .unwrap();

    assert!(results
        .values()
        .all(|record| record.status() == Some(RequestStatus::Cancelled)));
    assert!(web.visits().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancellation_reaches_platforms_queued_on_the_pool() {
    let web = FakeWeb::new();
    web.slow_everywhere(Duration::from_secs(30));
    let orchestrator = orchestrator(&web, 1);
    let media = CanonicalMedia::movie("Heat", "1995", 949).with_localized_title("盗火线");
    let flag = CancelFlag::new();

    let trigger = flag.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(250)).await;
        trigger.cancel();
    });
    let started = tokio::time::Instant::now();
    let results = orchestrator
        .aggregate(&media, &Platform::ALL, Arc::new(flag))
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(results.len(), 5);
    assert!(results
        .values()
        .all(|record| record.status() == Some(RequestStatus::Cancelled)));
    assert_eq!(web.opened.load(Ordering::SeqCst), web.closed.load(Ordering::SeqCst));
    assert_eq!(orchestrator.metrics().available_instances, 1);
}

#[tokio::test]
async fn zero_capacity_is_reported_to_the_caller() {
    let web = FakeWeb::new();
    let orchestrator = orchestrator(&web, 0);

    let err = orchestrator
        .aggregate(&inception(), &Platform::ALL, Arc::new(NeverCancelled))
        .await
        .unwrap_err();

    assert!(matches!(err, PoolError::NoCapacity { max_browsers: 0 }));
    assert!(web.visits().is_empty());
}

#[tokio::test]
async fn captcha_element_reports_rate_limit() {
    let web = FakeWeb::new();
    web.serve(
        &search_url(Platform::Douban, MediaType::Movie, "盗梦空间"),
        FakePage::new()
            .body("<html><body>豆瓣电影</body></html>")
            .text("#captcha_form", "请输入验证码"),
    );
    let orchestrator = orchestrator(&web, 1);

    let results = orchestrator
        .aggregate(&inception(), &[Platform::Douban], Arc::new(NeverCancelled))
        .await
        .unwrap();

    assert_eq!(
        results[&Platform::Douban].status(),
        Some(RequestStatus::RateLimit)
    );
    assert_eq!(web.visits().len(), 1);
}

#[tokio::test]
async fn crashed_browser_fails_platform_and_is_replaced() {
    let web = FakeWeb::new();
    web.crashed.store(true, Ordering::SeqCst);
    let orchestrator = orchestrator(&web, 2);

    let results = orchestrator
        .aggregate(&inception(), &[Platform::Imdb], Arc::new(NeverCancelled))
        .await
        .unwrap();

    assert_eq!(
        results[&Platform::Imdb].status(),
        Some(RequestStatus::FetchFailed)
    );
    let metrics = orchestrator.metrics();
    assert_eq!(metrics.crash_count, 1);
    assert_eq!(metrics.failed_requests, 1);
    assert_eq!(metrics.active_instances, 2);
    assert_eq!(metrics.available_instances, 2);
}
