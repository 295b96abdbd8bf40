use chrono::{TimeZone, Utc};
use db::{
    pg::PgDatabase, CategoryRatingUpsert, ListingCreate, Repositories, ReviewFilter, ReviewQuery,
    ReviewUpsert,
};
use db_test_fixture::DbFixture;
use uuid::Uuid;

fn review(external_id: &str, listing_id: Uuid, rating: f64) -> ReviewUpsert {
    ReviewUpsert {
        source: "hostaway".into(),
        external_id: external_id.into(),
        listing_id,
        property_id: None,
        review_type: "guest_to_host".into(),
        channel: "airbnb".into(),
        rating,
        title: None,
        body: "Great stay".into(),
        author_name: Some("Amy".into()),
        language: "en".into(),
        created_at: Utc.with_ymd_and_hms(2020, 9, 10, 12, 0, 0).unwrap(),
        approved: true,
    }
}

async fn listing(db: &PgDatabase, external_id: &str) -> anyhow::Result<Uuid> {
    let created = db
        .listings()
        .create_if_absent(ListingCreate {
            external_id: external_id.into(),
            name: format!("Hostaway Listing {external_id}"),
            channel: None,
        })
        .await?;
    Ok(created.expect("fresh listing").id)
}

#[tokio::test]
async fn review_upsert_updates_in_place() -> anyhow::Result<()> {
    let fixture = match DbFixture::from_env() {
        Ok(fixture) => fixture,
        Err(err) => {
            eprintln!("skipping review_upsert_updates_in_place: {err}");
            return Ok(());
        }
    };
    let handle = fixture.create_unmigrated("review_upsert").await?;
    let db = PgDatabase::connect(handle.database_url()).await?;
    let listing_id = listing(&db, "2B N1 A").await?;

    let first = db.reviews().upsert(review("55", listing_id, 9.0)).await?;
    let mut changed = review("55", listing_id, 7.5);
    changed.approved = false;
    let second = db.reviews().upsert(changed).await?;
    assert_eq!(first, second, "upsert keeps the durable id");

    let rows = db
        .reviews()
        .query(ReviewQuery {
            limit: 10,
            ..ReviewQuery::default()
        })
        .await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].rating, 7.5);
    assert!(!rows[0].approved);

    let counts = db.reviews().ingestion_counts("hostaway").await?;
    assert_eq!(counts.total_reviews, 1);
    assert_eq!(counts.source_reviews, 1);
    assert_eq!(counts.approved_reviews, 0);
    assert_eq!(counts.total_listings, 1);

    handle.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn listing_create_if_absent_is_race_safe() -> anyhow::Result<()> {
    let fixture = match DbFixture::from_env() {
        Ok(fixture) => fixture,
        Err(err) => {
            eprintln!("skipping listing_create_if_absent_is_race_safe: {err}");
            return Ok(());
        }
    };
    let handle = fixture.create("listing_create").await?;
    let db = PgDatabase::from_pool(handle.pool().clone());

    let create = || ListingCreate {
        external_id: "L-1".into(),
        name: "Hostaway Listing L-1".into(),
        channel: Some("airbnb".into()),
    };
    let (a, b) = tokio::join!(
        db.listings().create_if_absent(create()),
        db.listings().create_if_absent(create())
    );
    let winners = [a?, b?].into_iter().flatten().count();
    assert_eq!(winners, 1, "exactly one writer inserts the listing");

    let stored = db.listings().get_by_external_id("L-1").await?;
    assert!(stored.is_some());

    handle.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn category_ratings_attach_and_update() -> anyhow::Result<()> {
    let fixture = match DbFixture::from_env() {
        Ok(fixture) => fixture,
        Err(err) => {
            eprintln!("skipping category_ratings_attach_and_update: {err}");
            return Ok(());
        }
    };
    let handle = fixture.create("category_ratings").await?;
    let db = PgDatabase::from_pool(handle.pool().clone());
    let listing_id = listing(&db, "L-2").await?;
    let review_id = db.reviews().upsert(review("77", listing_id, 8.0)).await?;

    let ratings = vec![
        CategoryRatingUpsert {
            name: "cleanliness".into(),
            rating: Some(8.0),
        },
        CategoryRatingUpsert {
            name: "location".into(),
            rating: Some(10.0),
        },
    ];
    db.categories().attach_ratings(review_id, &ratings).await?;
    db.categories()
        .attach_ratings(
            review_id,
            &[CategoryRatingUpsert {
                name: "cleanliness".into(),
                rating: Some(6.0),
            }],
        )
        .await?;

    let attached = db.categories().list_for_reviews(&[review_id]).await?;
    assert_eq!(attached.len(), 2);
    assert_eq!(attached[0].name, "cleanliness");
    assert_eq!(attached[0].rating, Some(6.0));
    assert_eq!(db.categories().list().await?.len(), 2);

    let by_category = db
        .reviews()
        .list_matching(ReviewFilter {
            category_id: Some(attached[1].category_id),
            ..ReviewFilter::default()
        })
        .await?;
    assert_eq!(by_category.len(), 1);

    handle.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn rejected_category_rolls_back_review_upsert() -> anyhow::Result<()> {
    let fixture = match DbFixture::from_env() {
        Ok(fixture) => fixture,
        Err(err) => {
            eprintln!("skipping rejected_category_rolls_back_review_upsert: {err}");
            return Ok(());
        }
    };
    let handle = fixture.create("upsert_with_ratings").await?;
    let db = PgDatabase::from_pool(handle.pool().clone());
    let listing_id = listing(&db, "L-4").await?;

    let review_id = db
        .reviews()
        .upsert_with_ratings(
            review("91", listing_id, 9.0),
            &[CategoryRatingUpsert {
                name: "cleanliness".into(),
                rating: Some(9.0),
            }],
        )
        .await?;

    // text columns reject NUL bytes, so the second category insert fails
    let result = db
        .reviews()
        .upsert_with_ratings(
            review("91", listing_id, 4.0),
            &[
                CategoryRatingUpsert {
                    name: "cleanliness".into(),
                    rating: Some(4.0),
                },
                CategoryRatingUpsert {
                    name: "bad\0name".into(),
                    rating: Some(4.0),
                },
            ],
        )
        .await;
    assert!(result.is_err());

    let rows = db
        .reviews()
        .query(ReviewQuery {
            limit: 10,
            ..ReviewQuery::default()
        })
        .await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].rating, 9.0);
    let attached = db.categories().list_for_reviews(&[review_id]).await?;
    assert_eq!(attached.len(), 1);
    assert_eq!(attached[0].rating, Some(9.0));

    handle.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn cleanup_removes_only_old_unapproved() -> anyhow::Result<()> {
    let fixture = match DbFixture::from_env() {
        Ok(fixture) => fixture,
        Err(err) => {
            eprintln!("skipping cleanup_removes_only_old_unapproved: {err}");
            return Ok(());
        }
    };
    let handle = fixture.create("review_cleanup").await?;
    let db = PgDatabase::from_pool(handle.pool().clone());
    let listing_id = listing(&db, "L-3").await?;

    let mut stale = review("1", listing_id, 4.0);
    stale.approved = false;
    db.reviews().upsert(stale).await?;
    db.reviews().upsert(review("2", listing_id, 9.0)).await?;

    let removed = db
        .reviews()
        .delete_unapproved_before(Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap())
        .await?;
    assert_eq!(removed, 1);
    assert!(db.reviews().get_by_key("2", "hostaway").await?.is_some());

    handle.cleanup().await?;
    Ok(())
}
