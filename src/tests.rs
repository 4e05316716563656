#![cfg(test)]

use chrono::NaiveDate;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rocket::http::{ContentType, Header, Status};
use rocket::local::blocking::Client;
use serde_json::Value;
use std::collections::HashMap;

use crate::analytics::{Recorded, ViewCounter};
use crate::config::BlogConfig;
use crate::db::{run_migrations, seed_defaults, DbPool};
use crate::error::ApiError;
use crate::models::analytics::PageView;
use crate::models::category::{Category, CategoryForm};
use crate::models::comment::{Comment, CommentForm};
use crate::models::notification::Notification;
use crate::models::post::{read_time, Post, PostForm};
use crate::models::settings::Setting;
use crate::models::tag::{Tag, TagForm};
use crate::models::user::{NewUser, Session, User};
use crate::query::{total_pages, PostFilter, PostQuery, SortKey, Visibility};
use crate::rate_limit::{Bucket, Limit, RateLimiter};
use crate::security::auth::{self, authorize, Capability, Principal};
use crate::slugs::{self, SlugTable};
use crate::transform::{self, author_display_name, FALLBACK_AUTHOR};

/// Atomic counter for unique shared-cache DB names so parallel tests don't collide.
static TEST_DB_COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);

/// Named shared-cache in-memory database so every pooled connection sees the
/// same data. Nothing is migrated.
fn bare_pool() -> DbPool {
    let id = TEST_DB_COUNTER.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    let uri = format!("file:quillpost_testdb_{}?mode=memory&cache=shared", id);
    let manager = SqliteConnectionManager::file(uri)
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys=ON;"));
    Pool::builder()
        .max_size(2)
        .build(manager)
        .expect("Failed to create test pool")
}

/// Fresh pool with all migrations and seed defaults applied.
fn test_pool() -> DbPool {
    let pool = bare_pool();
    run_migrations(&pool).expect("Failed to run migrations");
    seed_defaults(&pool).expect("Failed to seed defaults");
    pool
}

/// Cost-4 bcrypt so tests don't spend seconds hashing.
fn fast_hash(password: &str) -> String {
    bcrypt::hash(password, 4).unwrap()
}

fn make_user(pool: &DbPool, username: &str, full_name: Option<&str>, role: &str) -> i64 {
    User::create(
        pool,
        &NewUser {
            username: username.to_string(),
            email: format!("{}@example.com", username),
            full_name: full_name.map(str::to_string),
            password_hash: fast_hash("correct horse"),
            role: role.to_string(),
        },
    )
    .unwrap()
}

fn make_category(pool: &DbPool, name: &str, description: Option<&str>) -> i64 {
    Category::create(
        pool,
        &CategoryForm {
            name: name.to_string(),
            slug: None,
            description: description.map(str::to_string),
            color: None,
            icon: None,
        },
    )
    .unwrap()
}

fn make_tag(pool: &DbPool, name: &str) -> i64 {
    Tag::create(
        pool,
        &TagForm {
            name: name.to_string(),
            slug: None,
            description: None,
            color: None,
        },
    )
    .unwrap()
}

fn post_form(title: &str, published_at: &str) -> PostForm {
    PostForm {
        title: title.to_string(),
        content: format!("Body of {}", title),
        published: true,
        published_at: Some(published_at.to_string()),
        ..Default::default()
    }
}

fn make_post(pool: &DbPool, title: &str, published_at: &str) -> i64 {
    Post::create(pool, &post_form(title, published_at), None).unwrap()
}

fn set_views(pool: &DbPool, post_id: i64, views: i64) {
    let conn = pool.get().unwrap();
    conn.execute(
        "UPDATE posts SET view_count = ?1 WHERE id = ?2",
        rusqlite::params![views, post_id],
    )
    .unwrap();
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// `(date, views)` buckets stored for a path, oldest first.
fn buckets(pool: &DbPool, path: &str) -> Vec<(NaiveDate, i64)> {
    let conn = pool.get().unwrap();
    let mut stmt = conn
        .prepare("SELECT date, view_count FROM page_views WHERE page_path = ?1 ORDER BY date")
        .unwrap();
    let rows = stmt
        .query_map(rusqlite::params![path], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap();
    rows.collect::<rusqlite::Result<_>>().unwrap()
}

fn set_setting(pool: &DbPool, key: &str, value: &str) {
    let mut batch = HashMap::new();
    batch.insert(key.to_string(), value.to_string());
    Setting::set_many(pool, &batch).unwrap();
}

fn counter() -> ViewCounter {
    ViewCounter::new(&BlogConfig::default().counted_paths)
}

// ═══════════════════════════════════════════════════════════
// View counter
// ═══════════════════════════════════════════════════════════

#[test]
fn view_of_unlisted_path_creates_no_row() {
    let pool = test_pool();
    let c = counter();
    assert_eq!(c.record(&pool, "/admin/secret").unwrap(), Recorded::NotCountable);
    assert_eq!(c.record(&pool, "/blog/a/b").unwrap(), Recorded::NotCountable);
    assert_eq!(PageView::total_views(&pool, None).unwrap(), 0);
}

#[test]
fn views_same_day_share_one_bucket() {
    let pool = test_pool();
    let c = counter();
    let today = day(2024, 3, 1);
    c.record_on(&pool, "/about", today).unwrap();
    c.record_on(&pool, "/about", today).unwrap();

    assert_eq!(buckets(&pool, "/about"), vec![(today, 2)]);
}

#[test]
fn views_on_different_days_get_separate_buckets() {
    let pool = test_pool();
    let c = counter();
    c.record_on(&pool, "/", day(2024, 3, 1)).unwrap();
    c.record_on(&pool, "/", day(2024, 3, 2)).unwrap();

    assert_eq!(buckets(&pool, "/"), vec![(day(2024, 3, 1), 1), (day(2024, 3, 2), 1)]);
    assert_eq!(PageView::total_views(&pool, Some("/")).unwrap(), 2);
}

#[test]
fn post_page_views_are_counted() {
    let pool = test_pool();
    let c = counter();
    for _ in 0..3 {
        assert_eq!(c.record(&pool, "/blog/my-post").unwrap(), Recorded::Counted);
    }
    c.record(&pool, "/about").unwrap();

    assert_eq!(PageView::total_views(&pool, Some("/blog/my-post")).unwrap(), 3);
    assert_eq!(PageView::total_views(&pool, None).unwrap(), 4);
}

#[test]
fn view_paths_are_normalized_before_counting() {
    let pool = test_pool();
    let c = counter();
    let today = day(2024, 5, 5);
    c.record_on(&pool, "/blog/", today).unwrap();
    c.record_on(&pool, "/blog?page=2", today).unwrap();
    c.record_on(&pool, " /blog/hello#top ", today).unwrap();

    assert_eq!(buckets(&pool, "/blog"), vec![(today, 2)]);
    assert_eq!(buckets(&pool, "/blog/hello"), vec![(today, 1)]);
}

#[test]
fn missing_view_table_is_reported_not_raised() {
    let pool = bare_pool();
    let c = counter();
    assert_eq!(c.record(&pool, "/about").unwrap(), Recorded::TableMissing);
    // Fire-and-forget path must not panic either
    c.track(&pool, "/about");
}

#[test]
fn analytics_daily_and_top_pages() {
    let pool = test_pool();
    let c = counter();
    let today = day(2024, 6, 10);
    c.record_on(&pool, "/about", today).unwrap();
    c.record_on(&pool, "/about", today).unwrap();
    c.record_on(&pool, "/blog/x", day(2024, 6, 9)).unwrap();
    c.record_on(&pool, "/blog/x", day(2024, 5, 1)).unwrap();

    let daily = PageView::daily(&pool, today, 7, None).unwrap();
    assert_eq!(daily.len(), 2);
    assert_eq!(daily[0].date, day(2024, 6, 9));
    assert_eq!(daily[1].count, 2);

    let only_x = PageView::daily(&pool, today, 7, Some("/blog/x")).unwrap();
    assert_eq!(only_x.len(), 1);

    let top = PageView::top_pages(&pool, today, 7, 10).unwrap();
    assert_eq!(top[0].path, "/about");
    assert_eq!(top[0].count, 2);
    assert_eq!(top.len(), 2);
}

// ═══════════════════════════════════════════════════════════
// Query builder
// ═══════════════════════════════════════════════════════════

#[test]
fn total_pages_is_never_zero() {
    for limit in 1..=12 {
        for total in 0..=60 {
            let expected = ((total as f64) / (limit as f64)).ceil().max(1.0) as i64;
            assert_eq!(total_pages(total, limit), expected, "total={} limit={}", total, limit);
        }
    }
}

#[test]
fn category_listing_pages_through_twelve_posts() {
    let pool = test_pool();
    let cat = make_category(&pool, "Rust", None);
    for i in 0..12 {
        let mut form = post_form(&format!("Post {:02}", i), &format!("2024-01-{:02}T09:00", i + 1));
        form.category_ids = vec![cat];
        Post::create(&pool, &form, None).unwrap();
    }

    let query = |page| {
        PostQuery::published(Some(page), 5)
            .filtered(PostFilter::Category("rust".to_string()))
            .run(&pool)
            .unwrap()
    };

    let first = query(1);
    assert_eq!(first.total, 12);
    assert_eq!(first.total_pages, 3);
    assert_eq!(first.items.len(), 5);
    assert_eq!(first.items[0].post.title, "Post 11");

    assert_eq!(query(3).items.len(), 2);

    let past_end = query(4);
    assert!(past_end.items.is_empty());
    assert_eq!(past_end.total, 12);
    assert_eq!(past_end.page, 4);
}

#[test]
fn empty_tag_listing_has_one_page() {
    let pool = test_pool();
    make_tag(&pool, "Lonely");
    make_post(&pool, "Untagged", "2024-02-01T10:00");

    let page = PostQuery::published(Some(1), 9)
        .sorted(SortKey::Oldest, None)
        .filtered(PostFilter::Tag("lonely".to_string()))
        .run(&pool)
        .unwrap();
    assert_eq!(page.total, 0);
    assert_eq!(page.total_pages, 1);
    assert!(page.items.is_empty());
}

#[test]
fn page_below_one_is_coerced() {
    let query = PostQuery::published(Some(-3), 10);
    assert_eq!(query.page, 1);
    assert_eq!(query.offset(), 0);
    assert_eq!(PostQuery::published(Some(3), 10).offset(), 20);
}

#[test]
fn drafts_are_excluded_from_public_listings() {
    let pool = test_pool();
    make_post(&pool, "Live", "2024-01-01T10:00");
    let mut draft = post_form("Draft", "2024-01-02T10:00");
    draft.published = false;
    Post::create(&pool, &draft, None).unwrap();

    let public = PostQuery::published(None, 10).run(&pool).unwrap();
    assert_eq!(public.total, 1);
    assert_eq!(public.items[0].post.title, "Live");

    let drafts = PostQuery::published(None, 10)
        .visibility(Visibility::Drafts)
        .run(&pool)
        .unwrap();
    assert_eq!(drafts.total, 1);
    assert_eq!(drafts.items[0].post.title, "Draft");

    let all = PostQuery::published(None, 10).visibility(Visibility::All).run(&pool).unwrap();
    assert_eq!(all.total, 2);
}

#[test]
fn sort_by_views_is_non_increasing() {
    let pool = test_pool();
    for (i, views) in [5, 1, 9, 3, 7].iter().enumerate() {
        let id = make_post(&pool, &format!("P{}", i), &format!("2024-03-{:02}T08:00", i + 1));
        set_views(&pool, id, *views);
    }

    let page = PostQuery::published(None, 10)
        .sorted(SortKey::Views, None)
        .run(&pool)
        .unwrap();
    let views: Vec<i64> = page.items.iter().map(|r| r.post.view_count).collect();
    assert_eq!(views.len(), 5);
    assert!(views.windows(2).all(|w| w[0] >= w[1]), "{:?}", views);
}

#[test]
fn sort_by_title_and_read_time_ascend() {
    let pool = test_pool();
    for (title, words) in [("Charlie", 450), ("alpha", 10), ("Bravo", 900)] {
        let mut form = post_form(title, "2024-04-01T08:00");
        form.content = "word ".repeat(words);
        Post::create(&pool, &form, None).unwrap();
    }

    let by_title = PostQuery::published(None, 10)
        .sorted(SortKey::Title, None)
        .run(&pool)
        .unwrap();
    let titles: Vec<&str> = by_title.items.iter().map(|r| r.post.title.as_str()).collect();
    assert_eq!(titles, vec!["Bravo", "Charlie", "alpha"]);

    let by_time = PostQuery::published(None, 10)
        .sorted(SortKey::ReadTime, None)
        .run(&pool)
        .unwrap();
    let times: Vec<i64> = by_time.items.iter().map(|r| r.post.read_time).collect();
    assert_eq!(times, vec![1, 3, 5]);
}

#[test]
fn newest_and_oldest_sort_by_publish_date() {
    let pool = test_pool();
    make_post(&pool, "Middle", "2024-02-01T10:00");
    make_post(&pool, "First", "2024-01-01T10:00");
    make_post(&pool, "Last", "2024-03-01T10:00");

    let newest = PostQuery::published(None, 10).run(&pool).unwrap();
    assert_eq!(newest.items[0].post.title, "Last");

    let oldest = PostQuery::published(None, 10)
        .sorted(SortKey::Oldest, None)
        .run(&pool)
        .unwrap();
    assert_eq!(oldest.items[0].post.title, "First");
}

#[test]
fn search_matches_posts_and_taxonomy_case_insensitively() {
    let pool = test_pool();
    let systems = make_category(&pool, "Systems", Some("Low-level programming"));
    let mut form = post_form("Ownership explained", "2024-01-05T10:00");
    form.category_ids = vec![systems];
    Post::create(&pool, &form, None).unwrap();
    make_post(&pool, "Gardening notes", "2024-01-06T10:00");

    let search = |text: &str| {
        PostQuery::published(None, 10)
            .filtered(PostFilter::Search(text.to_string()))
            .run(&pool)
            .unwrap()
    };

    assert_eq!(search("OWNERSHIP").total, 1);
    assert_eq!(search("low-LEVEL").total, 1);
    assert_eq!(search("notes").total, 1);
    assert_eq!(search("o").total, 2);
    // LIKE wildcards are literal
    assert_eq!(search("%").total, 0);
    assert_eq!(search("_").total, 0);
}

// ═══════════════════════════════════════════════════════════
// Transform
// ═══════════════════════════════════════════════════════════

#[test]
fn author_name_falls_back_in_order() {
    assert_eq!(author_display_name(Some("Ada Lovelace"), Some("ada")), "Ada Lovelace");
    assert_eq!(author_display_name(None, Some("ada")), "ada");
    assert_eq!(author_display_name(Some("   "), Some("ada")), "ada");
    assert_eq!(author_display_name(None, None), FALLBACK_AUTHOR);
    assert_eq!(author_display_name(Some(""), Some("")), "Author");
}

#[test]
fn summaries_flatten_taxonomy_names() {
    let pool = test_pool();
    let author = make_user(&pool, "grace", None, "admin");
    let rust = make_category(&pool, "Rust", None);
    let web = make_category(&pool, "Web", None);
    let async_tag = make_tag(&pool, "async");

    let mut form = post_form("Tokio tour", "2024-01-01T10:00");
    form.category_ids = vec![web, rust];
    form.tag_ids = vec![async_tag];
    Post::create(&pool, &form, Some(author)).unwrap();
    make_post(&pool, "Anonymous", "2023-12-01T10:00");

    let page = PostQuery::published(None, 10).run(&pool).unwrap();
    let summaries = transform::summarize_page(&pool, page).unwrap();
    assert_eq!(summaries.items.len(), 2);

    let tour = &summaries.items[0];
    assert_eq!(tour.categories, vec!["Rust", "Web"]);
    assert_eq!(tour.tags, vec!["async"]);
    assert_eq!(tour.author, "grace");

    let anonymous = &summaries.items[1];
    assert!(anonymous.categories.is_empty());
    assert_eq!(anonymous.author, FALLBACK_AUTHOR);
}

#[test]
fn page_json_uses_camel_case_paging_fields() {
    let pool = test_pool();
    make_post(&pool, "One", "2024-01-01T10:00");
    let page = PostQuery::published(None, 10).run(&pool).unwrap();
    let body = transform::summarize_page(&pool, page).unwrap().to_json("posts");

    assert_eq!(body["total"], 1);
    assert_eq!(body["totalPages"], 1);
    assert_eq!(body["limit"], 10);
    assert_eq!(body["posts"][0]["readTime"], 1);
    assert!(body["posts"][0].get("content").is_none());
}

// ═══════════════════════════════════════════════════════════
// Posts, categories, tags
// ═══════════════════════════════════════════════════════════

#[test]
fn slugify_and_unique_slugs() {
    let pool = test_pool();
    assert_eq!(slugs::slugify("Hello, World!"), "hello-world");
    assert_eq!(slugs::slug_or_derive(Some("  "), "My Title"), "my-title");
    assert_eq!(slugs::slug_or_derive(None, "!!!"), "untitled");

    let first = make_post(&pool, "Same Title", "2024-01-01T10:00");
    let second = make_post(&pool, "Same Title", "2024-01-02T10:00");
    let slug_of = |id| Post::find_by_id(&pool, id).unwrap().unwrap().post.slug;
    assert_eq!(slug_of(first), "same-title");
    assert_eq!(slug_of(second), "same-title-2");
    assert_eq!(
        slugs::unique_slug(&pool, SlugTable::Posts, "same-title", Some(first)).unwrap(),
        "same-title"
    );
}

#[test]
fn explicit_duplicate_slug_is_a_conflict() {
    let pool = test_pool();
    let mut form = post_form("A", "2024-01-01T10:00");
    form.slug = Some("taken".to_string());
    Post::create(&pool, &form, None).unwrap();

    let err = Post::create(&pool, &form, None).unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));
}

#[test]
fn post_validation_errors_are_bad_requests() {
    let pool = test_pool();
    let blank = post_form("   ", "2024-01-01T10:00");
    assert!(matches!(Post::create(&pool, &blank, None), Err(ApiError::BadRequest(_))));

    let bad_date = post_form("Dated", "yesterday");
    assert!(matches!(Post::create(&pool, &bad_date, None), Err(ApiError::BadRequest(_))));

    let mut unknown_cat = post_form("Orphan", "2024-01-01T10:00");
    unknown_cat.category_ids = vec![999];
    assert!(matches!(Post::create(&pool, &unknown_cat, None), Err(ApiError::BadRequest(_))));
    // Rolled back with the failed relation
    assert!(Post::find_published(&pool, "orphan").unwrap().is_none());
}

#[test]
fn post_update_publish_and_delete() {
    let pool = test_pool();
    let mut form = post_form("Draft first", "");
    form.published = false;
    form.published_at = None;
    let id = Post::create(&pool, &form, None).unwrap();
    assert!(Post::find_by_id(&pool, id).unwrap().unwrap().post.published_at.is_none());

    Post::set_published(&pool, id, true).unwrap();
    let row = Post::find_by_id(&pool, id).unwrap().unwrap();
    assert!(row.post.published);
    assert!(row.post.published_at.is_some());

    form.title = "Renamed".to_string();
    form.content = "word ".repeat(401);
    form.published = true;
    Post::update(&pool, id, &form).unwrap();
    let row = Post::find_by_id(&pool, id).unwrap().unwrap();
    assert_eq!(row.post.title, "Renamed");
    assert_eq!(row.post.read_time, 3);

    Post::delete(&pool, id).unwrap();
    assert!(Post::find_by_id(&pool, id).unwrap().is_none());
    assert!(matches!(Post::delete(&pool, id), Err(ApiError::NotFound(_))));
    assert!(matches!(Post::set_published(&pool, id, true), Err(ApiError::NotFound(_))));
}

#[test]
fn read_time_rounds_up_with_floor_of_one() {
    assert_eq!(read_time(""), 1);
    assert_eq!(read_time(&"w ".repeat(200)), 1);
    assert_eq!(read_time(&"w ".repeat(201)), 2);
}

#[test]
fn related_posts_prefer_shared_taxonomy() {
    let pool = test_pool();
    let rust = make_category(&pool, "Rust", None);
    let async_tag = make_tag(&pool, "async");

    let mut base = post_form("Base", "2024-01-01T10:00");
    base.category_ids = vec![rust];
    base.tag_ids = vec![async_tag];
    let base_id = Post::create(&pool, &base, None).unwrap();

    let mut both = post_form("Shares both", "2024-01-02T10:00");
    both.category_ids = vec![rust];
    both.tag_ids = vec![async_tag];
    Post::create(&pool, &both, None).unwrap();

    let mut one = post_form("Shares one", "2024-01-03T10:00");
    one.category_ids = vec![rust];
    Post::create(&pool, &one, None).unwrap();

    make_post(&pool, "Unrelated", "2024-01-04T10:00");

    let related = Post::related(&pool, base_id, 3).unwrap();
    let titles: Vec<&str> = related.iter().map(|r| r.post.title.as_str()).collect();
    assert_eq!(titles, vec!["Shares both", "Shares one"]);
}

#[test]
fn category_and_tag_crud_with_published_counts() {
    let pool = test_pool();
    let cat = make_category(&pool, "Design Notes", Some("UI"));
    let tag = make_tag(&pool, "css");

    let mut live = post_form("Live", "2024-01-01T10:00");
    live.category_ids = vec![cat];
    live.tag_ids = vec![tag];
    Post::create(&pool, &live, None).unwrap();
    let mut draft = post_form("Draft", "2024-01-01T10:00");
    draft.published = false;
    draft.category_ids = vec![cat];
    Post::create(&pool, &draft, None).unwrap();

    let found = Category::find_by_slug(&pool, "design-notes").unwrap().unwrap();
    assert_eq!(found.post_count, 1);
    assert_eq!(Tag::find_by_slug(&pool, "css").unwrap().unwrap().post_count, 1);

    Category::update(
        &pool,
        cat,
        &CategoryForm {
            name: "Design".to_string(),
            slug: Some("design".to_string()),
            description: None,
            color: Some("#333".to_string()),
            icon: None,
        },
    )
    .unwrap();
    assert!(Category::find_by_slug(&pool, "design").unwrap().is_some());

    let blank = TagForm { name: " ".to_string(), slug: None, description: None, color: None };
    assert!(matches!(Tag::create(&pool, &blank), Err(ApiError::BadRequest(_))));

    Tag::delete(&pool, tag).unwrap();
    assert!(Tag::list(&pool).unwrap().is_empty());
    Category::delete(&pool, cat).unwrap();
    assert!(matches!(Category::delete(&pool, cat), Err(ApiError::NotFound(_))));
}

// ═══════════════════════════════════════════════════════════
// Comments, notifications, settings
// ═══════════════════════════════════════════════════════════

fn comment_form(name: &str, email: Option<&str>, body: &str) -> CommentForm {
    CommentForm {
        author_name: name.to_string(),
        author_email: email.map(str::to_string),
        body: body.to_string(),
    }
}

#[test]
fn comment_moderation_lifecycle() {
    let pool = test_pool();
    let post = make_post(&pool, "Talk", "2024-01-01T10:00");

    let pending = Comment::create(&pool, post, &comment_form("Bo", Some("bo@example.com"), "Hi"), "pending").unwrap();
    assert!(Comment::approved_for_post(&pool, post).unwrap().is_empty());
    assert_eq!(Comment::count(&pool, Some("pending")).unwrap(), 1);

    Comment::update_status(&pool, pending, "approved").unwrap();
    let visible = Comment::approved_for_post(&pool, post).unwrap();
    assert_eq!(visible.len(), 1);
    assert!(visible[0].author_email.is_none());

    assert!(matches!(Comment::update_status(&pool, pending, "deleted"), Err(ApiError::BadRequest(_))));
    assert!(matches!(Comment::update_status(&pool, 999, "spam"), Err(ApiError::NotFound(_))));

    Comment::delete(&pool, pending).unwrap();
    assert_eq!(Comment::count(&pool, None).unwrap(), 0);
}

#[test]
fn comment_validation() {
    let pool = test_pool();
    let post = make_post(&pool, "Talk", "2024-01-01T10:00");
    for form in [
        comment_form("", None, "body"),
        comment_form("Name", None, "  "),
        comment_form("Name", Some("not-an-email"), "body"),
    ] {
        assert!(matches!(Comment::create(&pool, post, &form, "pending"), Err(ApiError::BadRequest(_))));
    }
}

#[test]
fn notifications_track_read_state() {
    let pool = test_pool();
    let id = Notification::create(&pool, "comment", "New comment", Some("/blog/x")).unwrap();
    Notification::create(&pool, "comment", "Another", None).unwrap();
    assert_eq!(Notification::unread_count(&pool).unwrap(), 2);

    Notification::mark_read(&pool, id).unwrap();
    assert_eq!(Notification::unread_count(&pool).unwrap(), 1);
    assert_eq!(Notification::list(&pool, true, 10).unwrap().len(), 1);
    assert_eq!(Notification::list(&pool, false, 10).unwrap().len(), 2);
    assert!(matches!(Notification::mark_read(&pool, 999), Err(ApiError::NotFound(_))));
}

#[test]
fn settings_seed_and_upsert() {
    let pool = test_pool();
    assert_eq!(Setting::get_or(&pool, "comments_moderation", "x"), "manual");
    assert!(Setting::get_bool(&pool, "comments_enabled"));
    assert_eq!(Setting::get_or(&pool, "missing", "fallback"), "fallback");

    set_setting(&pool, "site_name", "Renamed");
    let mut batch = HashMap::new();
    batch.insert("comments_moderation".to_string(), "auto".to_string());
    batch.insert("custom".to_string(), "1".to_string());
    Setting::set_many(&pool, &batch).unwrap();

    let all = Setting::all(&pool).unwrap();
    assert_eq!(all["site_name"], "Renamed");
    assert_eq!(all["comments_moderation"], "auto");
    assert!(Setting::get_bool(&pool, "custom"));
}

// ═══════════════════════════════════════════════════════════
// Auth and rate limiting
// ═══════════════════════════════════════════════════════════

#[test]
fn capability_check_is_ordered() {
    let pool = test_pool();
    make_user(&pool, "root", Some("Root"), "admin");
    make_user(&pool, "reader", None, "user");
    let as_principal = |login| Principal(User::find_by_login(&pool, login).unwrap());

    let anonymous = Principal::default();
    assert_eq!(anonymous.capability(), Capability::Anonymous);
    assert!(authorize(&anonymous, Capability::Anonymous).unwrap().is_none());
    assert!(matches!(authorize(&anonymous, Capability::Authenticated), Err(ApiError::Unauthorized)));

    let reader = as_principal("reader");
    assert_eq!(reader.capability(), Capability::Authenticated);
    assert!(authorize(&reader, Capability::Authenticated).is_ok());
    assert!(matches!(authorize(&reader, Capability::Admin), Err(ApiError::Unauthorized)));

    let admin = as_principal("root");
    assert_eq!(admin.capability(), Capability::Admin);
    assert_eq!(authorize(&admin, Capability::Admin).unwrap().unwrap().username, "root");
}

#[test]
fn sessions_resolve_until_destroyed() {
    let pool = test_pool();
    let user = make_user(&pool, "sam", None, "user");
    let sid = Session::create(&pool, user, 1).unwrap();
    assert_eq!(Session::user(&pool, &sid).unwrap().unwrap().id, user);

    {
        let conn = pool.get().unwrap();
        conn.execute(
            "UPDATE sessions SET expires_at = '2000-01-01 00:00:00' WHERE id = ?1",
            rusqlite::params![sid],
        )
        .unwrap();
    }
    assert!(Session::user(&pool, &sid).unwrap().is_none());
    assert_eq!(Session::cleanup_expired(&pool).unwrap(), 1);

    let sid = Session::create(&pool, user, 1).unwrap();
    Session::destroy(&pool, &sid).unwrap();
    assert!(Session::user(&pool, &sid).unwrap().is_none());
}

#[test]
fn login_lookup_accepts_username_or_email() {
    let pool = test_pool();
    make_user(&pool, "kim", None, "user");
    let by_name = User::find_by_login(&pool, "kim").unwrap().unwrap();
    let by_email = User::find_by_login(&pool, "kim@example.com").unwrap().unwrap();
    assert_eq!(by_name.id, by_email.id);
    assert!(auth::verify_password("correct horse", &by_name.password_hash));
    assert!(!auth::verify_password("wrong", &by_name.password_hash));

    let json = serde_json::to_value(&by_name).unwrap();
    assert!(json.get("passwordHash").is_none());
}

#[test]
fn rate_limiter_blocks_after_max_attempts() {
    let window = std::time::Duration::from_secs(60);
    let limiter = RateLimiter::new(
        Limit { max_attempts: 2, window },
        Limit { max_attempts: 1, window },
    );
    assert!(limiter.check_and_record(Bucket::Login, "a"));
    assert!(limiter.check_and_record(Bucket::Login, "a"));
    assert!(!limiter.check_and_record(Bucket::Login, "a"));
    // Buckets and clients are independent
    assert!(limiter.check_and_record(Bucket::Login, "b"));
    assert!(limiter.check_and_record(Bucket::Comment, "a"));
    assert!(!limiter.check_and_record(Bucket::Comment, "a"));

    limiter.reset(Bucket::Login, "a");
    assert!(limiter.check_and_record(Bucket::Login, "a"));
}

#[test]
fn hashed_ips_are_stable_and_opaque() {
    let a = auth::hash_ip("203.0.113.7");
    assert_eq!(a, auth::hash_ip("203.0.113.7"));
    assert_ne!(a, auth::hash_ip("203.0.113.8"));
    assert_eq!(a.len(), 64);
}

// ═══════════════════════════════════════════════════════════
// HTTP
// ═══════════════════════════════════════════════════════════

fn client_with(pool: &DbPool, config: BlogConfig) -> Client {
    Client::tracked(crate::build(pool.clone(), config)).expect("valid rocket instance")
}

fn client(pool: &DbPool) -> Client {
    client_with(pool, BlogConfig::default())
}

fn post_json(client: &Client, uri: &str, body: &str) -> (Status, Value) {
    let response = client.post(uri.to_string()).header(ContentType::JSON).body(body).dispatch();
    let status = response.status();
    (status, response.into_json().unwrap_or(Value::Null))
}

fn get_json(client: &Client, uri: &str) -> (Status, Value) {
    let response = client.get(uri.to_string()).dispatch();
    let status = response.status();
    (status, response.into_json().unwrap_or(Value::Null))
}

#[test]
fn http_view_tracking_status_codes() {
    let pool = test_pool();
    let client = client(&pool);

    let (status, body) = post_json(&client, "/api/views", r#"{"pagePath":"/about"}"#);
    assert_eq!(status, Status::Ok);
    assert_eq!(body["success"], true);
    assert_eq!(PageView::total_views(&pool, Some("/about")).unwrap(), 1);

    // Not allow-listed still succeeds, nothing stored
    let (status, _) = post_json(&client, "/api/views", r#"{"pagePath":"/wp-login.php"}"#);
    assert_eq!(status, Status::Ok);
    assert_eq!(PageView::total_views(&pool, None).unwrap(), 1);

    let (status, body) = post_json(&client, "/api/views", "{}");
    assert_eq!(status, Status::BadRequest);
    assert_eq!(body["success"], false);

    let (status, body) = post_json(&client, "/api/views", "{not json");
    assert_eq!(status, Status::InternalServerError);
    assert_eq!(body["error"], "Internal server error");

    let (status, body) = get_json(&client, "/api/views?path=/about/");
    assert_eq!(status, Status::Ok);
    assert_eq!(body["totalViews"], 1);
}

#[test]
fn http_view_tracking_without_table_still_succeeds() {
    let pool = bare_pool();
    let client = client(&pool);
    let (status, body) = post_json(&client, "/api/views", r#"{"pagePath":"/blog/hello"}"#);
    assert_eq!(status, Status::Ok);
    assert_eq!(body["success"], true);
}

#[test]
fn http_listings_and_not_found() {
    let pool = test_pool();
    let cat = make_category(&pool, "Rust", None);
    for i in 0..3 {
        let mut form = post_form(&format!("Post {}", i), &format!("2024-01-0{}T10:00", i + 1));
        form.category_ids = vec![cat];
        Post::create(&pool, &form, None).unwrap();
    }
    let client = client(&pool);

    let (status, body) = get_json(&client, "/api/posts?limit=2&page=2");
    assert_eq!(status, Status::Ok);
    assert_eq!(body["total"], 3);
    assert_eq!(body["totalPages"], 2);
    assert_eq!(body["posts"].as_array().unwrap().len(), 1);

    let (_, body) = get_json(&client, "/api/categories/rust/posts?sortBy=title&order=desc");
    assert_eq!(body["category"]["name"], "Rust");
    assert_eq!(body["posts"][0]["title"], "Post 2");
    assert_eq!(body["posts"][0]["categories"][0], "Rust");

    let (status, body) = get_json(&client, "/api/categories/nope/posts");
    assert_eq!(status, Status::NotFound);
    assert_eq!(body["error"], "Category not found");

    let (status, _) = get_json(&client, "/api/posts/does-not-exist");
    assert_eq!(status, Status::NotFound);

    let (status, body) = get_json(&client, "/api/no-such-route");
    assert_eq!(status, Status::NotFound);
    assert_eq!(body["success"], false);
}

#[test]
fn http_post_detail_bumps_view_count() {
    let pool = test_pool();
    let id = make_post(&pool, "Hello", "2024-01-01T10:00");
    let client = client(&pool);

    let (status, body) = get_json(&client, "/api/posts/hello");
    assert_eq!(status, Status::Ok);
    assert_eq!(body["post"]["viewCount"], 1);
    assert_eq!(body["post"]["author"], FALLBACK_AUTHOR);
    assert!(body["post"]["content"].is_string());
    assert_eq!(Post::find_by_id(&pool, id).unwrap().unwrap().post.view_count, 1);
}

#[test]
fn http_blank_search_is_an_empty_page() {
    let pool = test_pool();
    make_post(&pool, "Anything", "2024-01-01T10:00");
    let client = client(&pool);

    let (status, body) = get_json(&client, "/api/search?q=%20%20");
    assert_eq!(status, Status::Ok);
    assert_eq!(body["total"], 0);
    assert_eq!(body["totalPages"], 1);
    assert!(body["posts"].as_array().unwrap().is_empty());

    let (_, body) = get_json(&client, "/api/search?q=anything");
    assert_eq!(body["total"], 1);
    assert_eq!(body["query"], "anything");
}

#[test]
fn http_admin_requires_admin_session() {
    let pool = test_pool();
    make_user(&pool, "admin", Some("Site Admin"), "admin");
    make_user(&pool, "reader", None, "user");
    let client = client(&pool);

    let (status, body) = get_json(&client, "/api/admin/dashboard");
    assert_eq!(status, Status::Unauthorized);
    assert_eq!(body["error"], "Authentication required");

    let (status, _) = post_json(&client, "/api/auth/login", r#"{"login":"admin","password":"nope"}"#);
    assert_eq!(status, Status::Unauthorized);

    // Plain users can sign in but not reach the admin API
    let (status, _) = post_json(&client, "/api/auth/login", r#"{"login":"reader","password":"correct horse"}"#);
    assert_eq!(status, Status::Ok);
    let (status, body) = get_json(&client, "/api/auth/me");
    assert_eq!(status, Status::Ok);
    assert_eq!(body["capability"], "authenticated");
    let (status, _) = get_json(&client, "/api/admin/dashboard");
    assert_eq!(status, Status::Unauthorized);

    let (status, body) = post_json(&client, "/api/auth/login", r#"{"login":"admin@example.com","password":"correct horse"}"#);
    assert_eq!(status, Status::Ok);
    assert_eq!(body["user"]["username"], "admin");
    let (status, body) = get_json(&client, "/api/admin/dashboard");
    assert_eq!(status, Status::Ok);
    assert_eq!(body["postsPublished"], 0);

    let (status, _) = post_json(&client, "/api/auth/logout", "");
    assert_eq!(status, Status::Ok);
    let (status, _) = get_json(&client, "/api/admin/dashboard");
    assert_eq!(status, Status::Unauthorized);
}

#[test]
fn http_login_is_rate_limited() {
    let pool = test_pool();
    let config = BlogConfig {
        login_attempts: 2,
        ..BlogConfig::default()
    };
    let client = client_with(&pool, config);
    let attempt = r#"{"login":"ghost","password":"x"}"#;

    assert_eq!(post_json(&client, "/api/auth/login", attempt).0, Status::Unauthorized);
    assert_eq!(post_json(&client, "/api/auth/login", attempt).0, Status::Unauthorized);
    let (status, body) = post_json(&client, "/api/auth/login", attempt);
    assert_eq!(status, Status::TooManyRequests);
    assert_eq!(body["success"], false);
}

#[test]
fn http_forwarded_header_does_not_reset_login_limit() {
    let pool = test_pool();
    let config = BlogConfig {
        login_attempts: 2,
        ..BlogConfig::default()
    };
    let client = client_with(&pool, config);
    let attempt = |ip: &str| {
        client
            .post("/api/auth/login")
            .header(ContentType::JSON)
            .header(Header::new("X-Forwarded-For", ip.to_string()))
            .body(r#"{"login":"ghost","password":"x"}"#)
            .dispatch()
            .status()
    };

    assert_eq!(attempt("10.0.0.1"), Status::Unauthorized);
    assert_eq!(attempt("10.0.0.2"), Status::Unauthorized);
    assert_eq!(attempt("10.0.0.3"), Status::TooManyRequests);
}

#[test]
fn http_forwarded_header_is_honored_behind_proxy() {
    let pool = test_pool();
    let config = BlogConfig {
        login_attempts: 1,
        trust_proxy_headers: true,
        ..BlogConfig::default()
    };
    let client = client_with(&pool, config);
    let attempt = |ip: &str| {
        client
            .post("/api/auth/login")
            .header(ContentType::JSON)
            .header(Header::new("X-Forwarded-For", format!("{}, 172.16.0.1", ip)))
            .body(r#"{"login":"ghost","password":"x"}"#)
            .dispatch()
            .status()
    };

    assert_eq!(attempt("10.0.0.1"), Status::Unauthorized);
    assert_eq!(attempt("10.0.0.1"), Status::TooManyRequests);
    assert_eq!(attempt("10.0.0.2"), Status::Unauthorized);
}

#[test]
fn http_huge_page_number_is_an_empty_page() {
    let pool = test_pool();
    let cat = make_category(&pool, "Rust", None);
    let mut form = post_form("Only post", "2024-01-01T10:00");
    form.category_ids = vec![cat];
    Post::create(&pool, &form, None).unwrap();
    let client = client(&pool);

    for uri in [
        format!("/api/posts?page={}", i64::MAX),
        "/api/posts?page=1844674407370955162".to_string(),
        format!("/api/categories/rust/posts?page={}&limit=50", i64::MAX),
        format!("/api/search?q=only&page={}", i64::MAX),
    ] {
        let (status, body) = get_json(&client, &uri);
        assert_eq!(status, Status::Ok, "{}", uri);
        assert!(body["posts"].as_array().unwrap().is_empty(), "{}", uri);
        assert_eq!(body["total"], 1);
        assert_eq!(body["totalPages"], 1);
    }
}

#[test]
fn http_admin_comment_pages() {
    let pool = test_pool();
    make_user(&pool, "admin", Some("Site Admin"), "admin");
    let post_id = make_post(&pool, "Busy thread", "2024-01-01T10:00");
    for i in 0..3 {
        let form = comment_form(&format!("Reader {}", i), None, "Great read");
        Comment::create(&pool, post_id, &form, "pending").unwrap();
    }
    let client = client(&pool);
    post_json(&client, "/api/auth/login", r#"{"login":"admin","password":"correct horse"}"#);

    let (status, body) = get_json(&client, "/api/admin/comments?page=1");
    assert_eq!(status, Status::Ok);
    assert_eq!(body["comments"].as_array().unwrap().len(), 3);
    assert_eq!(body["total"], 3);
    assert_eq!(body["totalPages"], 1);

    let (status, body) = get_json(&client, "/api/admin/comments?page=2");
    assert_eq!(status, Status::Ok);
    assert!(body["comments"].as_array().unwrap().is_empty());

    let (status, body) = get_json(&client, &format!("/api/admin/comments?status=pending&page={}", i64::MAX));
    assert_eq!(status, Status::Ok);
    assert!(body["comments"].as_array().unwrap().is_empty());
    assert_eq!(body["total"], 3);

    let (status, _) = get_json(&client, "/api/admin/comments?status=bogus");
    assert_eq!(status, Status::BadRequest);
}

#[test]
fn http_admin_creates_post_and_drafts_stay_private() {
    let pool = test_pool();
    make_user(&pool, "admin", Some("Site Admin"), "admin");
    let cat = make_category(&pool, "News", None);
    let client = client(&pool);
    post_json(&client, "/api/auth/login", r#"{"login":"admin","password":"correct horse"}"#);

    let body = format!(
        r#"{{"title":"Launch day","content":"We shipped.","published":false,"categoryIds":[{}]}}"#,
        cat
    );
    let (status, created) = post_json(&client, "/api/admin/posts", &body);
    assert_eq!(status, Status::Ok);
    let id = created["id"].as_i64().unwrap();

    let (status, _) = get_json(&client, "/api/posts/launch-day");
    assert_eq!(status, Status::NotFound);
    let (_, drafts) = get_json(&client, "/api/admin/posts?status=draft");
    assert_eq!(drafts["total"], 1);

    let response = client
        .put(format!("/api/admin/posts/{}/status", id))
        .header(ContentType::JSON)
        .body(r#"{"published":true}"#)
        .dispatch();
    assert_eq!(response.status(), Status::Ok);

    let (status, body) = get_json(&client, "/api/posts/launch-day");
    assert_eq!(status, Status::Ok);
    assert_eq!(body["post"]["author"], "Site Admin");
    assert_eq!(body["post"]["categories"][0], "News");

    let (status, _) = post_json(&client, "/api/admin/posts", r#"{"title":"","content":"x"}"#);
    assert_eq!(status, Status::BadRequest);
}

#[test]
fn http_comments_follow_moderation_setting() {
    let pool = test_pool();
    make_post(&pool, "Open thread", "2024-01-01T10:00");
    let client = client(&pool);
    let comment = r#"{"authorName":"Lee","authorEmail":"lee@example.com","body":"Nice post"}"#;

    let (status, body) = post_json(&client, "/api/posts/open-thread/comments", comment);
    assert_eq!(status, Status::Ok);
    assert_eq!(body["status"], "pending");
    assert_eq!(Notification::unread_count(&pool).unwrap(), 1);
    let (_, listed) = get_json(&client, "/api/posts/open-thread/comments");
    assert!(listed["comments"].as_array().unwrap().is_empty());

    set_setting(&pool, "comments_moderation", "auto");
    let (_, body) = post_json(&client, "/api/posts/open-thread/comments", comment);
    assert_eq!(body["status"], "approved");
    let (_, listed) = get_json(&client, "/api/posts/open-thread/comments");
    assert_eq!(listed["comments"].as_array().unwrap().len(), 1);
    assert!(listed["comments"][0].get("authorEmail").is_none());

    let (status, _) = post_json(&client, "/api/posts/missing/comments", comment);
    assert_eq!(status, Status::NotFound);
}
