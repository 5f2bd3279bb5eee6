use jiff::civil::DateTime;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use tracing::{info, warn};

use crate::{
    entities::film_review,
    error::{AppError, AppResult},
    films,
    models::{CreateReview, ReviewView, format_datetime, stored_datetime},
};

/// Reviews of a film, newest first.
pub async fn list(db: &DatabaseConnection, film_id: i32) -> AppResult<Vec<ReviewView>> {
    films::find_film(db, film_id).await?;

    let rows = film_review::Entity::find()
        .filter(film_review::Column::FilmId.eq(film_id))
        .order_by_desc(film_review::Column::Timestamp)
        .order_by_desc(film_review::Column::Id)
        .all(db)
        .await?;

    let reviewer_ids: Vec<i32> = rows.iter().map(|r| r.user_id).collect();
    let names = films::user_names(db, &reviewer_ids).await?;

    rows.into_iter()
        .map(|r| -> AppResult<ReviewView> {
            let (first, last) = names
                .get(&r.user_id)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("review {} has no reviewer row", r.id))?;
            Ok(ReviewView {
                reviewer_id: r.user_id,
                reviewer_first_name: first,
                reviewer_last_name: last,
                rating: r.rating,
                review: r.review,
                timestamp: r.timestamp,
            })
        })
        .collect()
}

/// Posts a review. Directors cannot review their own films and nobody can
/// review a film before its release.
pub async fn create(
    db: &DatabaseConnection,
    reviewer_id: i32,
    film_id: i32,
    req: CreateReview,
    now: DateTime,
) -> AppResult<()> {
    req.validate()?;

    let txn = db.begin().await?;
    let film = films::find_film(&txn, film_id).await?;

    if film.director_id == reviewer_id {
        warn!(film_id = film_id, user_id = reviewer_id, rule = "no_self_review", "review rejected");
        return Err(AppError::forbidden("cannot review your own film"));
    }
    if stored_datetime(&film.release_date)? > now {
        warn!(film_id = film_id, user_id = reviewer_id, rule = "released_only", "review rejected");
        return Err(AppError::forbidden("cannot review a film that has not been released"));
    }

    film_review::Entity::insert(film_review::ActiveModel {
        id: Default::default(),
        film_id: Set(film_id),
        user_id: Set(reviewer_id),
        rating: Set(req.rating),
        review: Set(req.review.filter(|r| !r.is_empty())),
        timestamp: Set(format_datetime(now)),
    })
    .exec(&txn)
    .await?;

    txn.commit().await?;
    info!(film_id = film_id, user_id = reviewer_id, rating = req.rating, "review created");
    Ok(())
}
