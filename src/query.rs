use std::collections::BTreeSet;

use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    Select,
    sea_query::{Expr, Func, LikeExpr, Query},
};
use tracing::warn;

use crate::{
    entities::{film, film_review, genre},
    error::{AppError, AppResult},
    models::{FilmSearchQuery, SortBy},
};

/// Rejects the request unless every id names an existing genre.
pub async fn ensure_genres_exist<C: ConnectionTrait>(db: &C, ids: &[i32]) -> AppResult<()> {
    let wanted: BTreeSet<i32> = ids.iter().copied().collect();
    if wanted.is_empty() {
        return Ok(());
    }

    let found = genre::Entity::find()
        .filter(genre::Column::Id.is_in(wanted.iter().copied()))
        .count(db)
        .await?;

    if found != wanted.len() as u64 {
        warn!(genre_ids = ?wanted, found = found, rule = "genre_exists", "unknown genre id");
        return Err(AppError::invalid("genreIds contains an unknown genre"));
    }
    Ok(())
}

/// Composes the filtered film select.
///
/// Filters are conjunctive. Rating sorts come back ordered by id; the caller
/// orders them once ratings are known.
pub fn build(params: &FilmSearchQuery) -> Select<film::Entity> {
    let mut select = film::Entity::find();

    if !params.genre_ids.is_empty() {
        select = select.filter(film::Column::GenreId.is_in(params.genre_ids.iter().copied()));
    }

    if !params.age_ratings.is_empty() {
        select = select
            .filter(film::Column::AgeRating.is_in(params.age_ratings.iter().map(|r| r.as_str())));
    }

    if let Some(q) = params.q.as_deref().filter(|q| !q.is_empty()) {
        // SQLite's lower() only folds ASCII; fold the needle the same way.
        let pattern = format!("%{}%", escape_like(&q.to_ascii_lowercase()));
        select = select.filter(
            Condition::any()
                .add(lower(film::Column::Title).like(LikeExpr::new(pattern.clone()).escape('\\')))
                .add(lower(film::Column::Description).like(LikeExpr::new(pattern).escape('\\'))),
        );
    }

    if let Some(director_id) = params.director_id {
        select = select.filter(film::Column::DirectorId.eq(director_id));
    }

    if let Some(reviewer_id) = params.reviewer_id {
        // A subquery keeps one row per film however many reviews match.
        select = select.filter(
            film::Column::Id.in_subquery(
                Query::select()
                    .column(film_review::Column::FilmId)
                    .from(film_review::Entity)
                    .and_where(film_review::Column::UserId.eq(reviewer_id))
                    .to_owned(),
            ),
        );
    }

    let select = match params.sort_by {
        SortBy::AlphabeticalAsc => select.order_by_asc(film::Column::Title),
        SortBy::AlphabeticalDesc => select.order_by_desc(film::Column::Title),
        SortBy::ReleasedAsc => select.order_by_asc(film::Column::ReleaseDate),
        SortBy::ReleasedDesc => select.order_by_desc(film::Column::ReleaseDate),
        SortBy::RatingAsc | SortBy::RatingDesc => select,
    };
    select.order_by_asc(film::Column::Id)
}

fn lower(col: film::Column) -> Expr {
    Expr::expr(Func::lower(Expr::col((film::Entity, col))))
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
