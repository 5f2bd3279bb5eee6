use std::collections::HashMap;

use jiff::civil::DateTime;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use tracing::{debug, info, warn};

use crate::{
    entities::{film, film_review, genre, user},
    error::{AppError, AppResult, unique_violation},
    models::{
        AgeRating, CreateFilm, EditFilm, FilmDetail, FilmPage, FilmSearchQuery, FilmSummary,
        GenreView, SortBy, format_datetime, parse_datetime, stored_datetime,
    },
    query,
    rating::{self, RatingSummary},
};

const DUPLICATE_TITLE: &str = "a film with that title already exists";

pub async fn find_film<C: ConnectionTrait>(db: &C, film_id: i32) -> AppResult<film::Model> {
    film::Entity::find_by_id(film_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::not_found(format!("no film with id {film_id}")))
}

/// Runs a film search: filter, aggregate ratings, sort, then paginate.
pub async fn list(db: &DatabaseConnection, params: &FilmSearchQuery) -> AppResult<FilmPage> {
    params.validate()?;
    query::ensure_genres_exist(db, &params.genre_ids).await?;

    let films = query::build(params).all(db).await?;
    let film_ids: Vec<i32> = films.iter().map(|f| f.id).collect();
    let director_ids: Vec<i32> = films.iter().map(|f| f.director_id).collect();

    let (directors, ratings) =
        futures::try_join!(user_names(db, &director_ids), ratings_for(db, &film_ids))?;

    let mut rows = Vec::with_capacity(films.len());
    for f in films {
        let (first, last) = directors
            .get(&f.director_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("film {} has no director row", f.id))?;
        let summary = ratings.get(&f.id).copied().unwrap_or_default();
        rows.push((
            FilmSummary {
                film_id: f.id,
                title: f.title,
                genre_id: f.genre_id,
                director_id: f.director_id,
                director_first_name: first,
                director_last_name: last,
                release_date: f.release_date,
                age_rating: f.age_rating,
                rating: summary.average,
            },
            summary,
        ));
    }

    if params.sort_by.is_rating() {
        let descending = params.sort_by == SortBy::RatingDesc;
        rows = rating::sort_by_rating(rows, descending, |(film, summary)| (film.film_id, *summary));
    }

    let total = rows.len();
    let start = params.start_index.unwrap_or(0) as usize;
    let take = params.count.map(|c| c as usize).unwrap_or(total);
    let films: Vec<FilmSummary> = rows.into_iter().skip(start).take(take).map(|(f, _)| f).collect();

    debug!(total = total, returned = films.len(), sort = ?params.sort_by, "film search");
    Ok(FilmPage { films, count: total })
}

pub async fn detail(db: &DatabaseConnection, film_id: i32) -> AppResult<FilmDetail> {
    let film = find_film(db, film_id).await?;

    let director_ids = [film.director_id];
    let film_ids = [film.id];
    let (directors, ratings) =
        futures::try_join!(user_names(db, &director_ids), ratings_for(db, &film_ids))?;
    let (first, last) = directors
        .get(&film.director_id)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("film {} has no director row", film.id))?;
    let summary = ratings.get(&film.id).copied().unwrap_or_default();

    Ok(FilmDetail {
        film_id: film.id,
        title: film.title,
        description: film.description,
        genre_id: film.genre_id,
        director_id: film.director_id,
        director_first_name: first,
        director_last_name: last,
        release_date: film.release_date,
        age_rating: film.age_rating,
        runtime: film.runtime,
        rating: summary.average,
        num_reviews: summary.count,
    })
}

pub async fn genres(db: &DatabaseConnection) -> AppResult<Vec<GenreView>> {
    let rows = genre::Entity::find().order_by_asc(genre::Column::Id).all(db).await?;
    Ok(rows.into_iter().map(|g| GenreView { genre_id: g.id, name: g.name }).collect())
}

/// Creates a film directed by `director_id` and returns its id.
pub async fn create(
    db: &DatabaseConnection,
    director_id: i32,
    req: CreateFilm,
    now: DateTime,
) -> AppResult<i32> {
    req.validate()?;
    let release = match req.release_date.as_deref() {
        Some(raw) => parse_datetime(raw)?,
        None => now,
    };

    let txn = db.begin().await?;
    query::ensure_genres_exist(&txn, &[req.genre_id]).await?;

    if title_taken(&txn, &req.title, None).await? {
        warn!(user_id = director_id, title = %req.title, rule = "unique_title", "film create rejected");
        return Err(AppError::forbidden(DUPLICATE_TITLE));
    }
    if release < now {
        warn!(user_id = director_id, release = %release, rule = "release_not_past", "film create rejected");
        return Err(AppError::forbidden("cannot release a film in the past"));
    }

    let inserted = film::Entity::insert(film::ActiveModel {
        id: Default::default(),
        title: Set(req.title),
        description: Set(req.description),
        release_date: Set(format_datetime(release)),
        image_filename: Set(None),
        runtime: Set(req.runtime),
        director_id: Set(director_id),
        genre_id: Set(req.genre_id),
        age_rating: Set(req.age_rating.unwrap_or(AgeRating::TBC).as_str().to_string()),
    })
    .exec(&txn)
    .await
    .map_err(|e| unique_violation(e, DUPLICATE_TITLE))?;

    txn.commit().await?;
    info!(film_id = inserted.last_insert_id, user_id = director_id, "film created");
    Ok(inserted.last_insert_id)
}

/// Applies a partial update. Only the director may edit, and only while the
/// film is unreviewed and unreleased.
pub async fn edit(
    db: &DatabaseConnection,
    caller_id: i32,
    film_id: i32,
    req: EditFilm,
    now: DateTime,
) -> AppResult<()> {
    req.validate()?;
    let new_release = req.release_date.as_deref().map(parse_datetime).transpose()?;

    let txn = db.begin().await?;
    let film = find_film(&txn, film_id).await?;

    if let Some(title) = &req.title {
        if title_taken(&txn, title, Some(film_id)).await? {
            warn!(film_id = film_id, title = %title, rule = "unique_title", "film edit rejected");
            return Err(AppError::invalid(DUPLICATE_TITLE));
        }
    }
    if let Some(genre_id) = req.genre_id {
        query::ensure_genres_exist(&txn, &[genre_id]).await?;
    }

    if film.director_id != caller_id {
        warn!(film_id = film_id, user_id = caller_id, rule = "director_only", "film edit rejected");
        return Err(AppError::forbidden("only the director may edit a film"));
    }
    let reviews = film_review::Entity::find()
        .filter(film_review::Column::FilmId.eq(film_id))
        .count(&txn)
        .await?;
    if reviews > 0 {
        warn!(film_id = film_id, reviews = reviews, rule = "unreviewed_only", "film edit rejected");
        return Err(AppError::forbidden("cannot edit a film that has been reviewed"));
    }
    if stored_datetime(&film.release_date)? <= now {
        warn!(film_id = film_id, rule = "unreleased_only", "film edit rejected");
        return Err(AppError::forbidden("cannot edit a film that has already been released"));
    }
    if new_release.is_some_and(|r| r < now) {
        warn!(film_id = film_id, rule = "release_not_past", "film edit rejected");
        return Err(AppError::forbidden("cannot release a film in the past"));
    }

    let mut active: film::ActiveModel = film.into();
    if let Some(title) = req.title {
        active.title = Set(title);
    }
    if let Some(description) = req.description {
        active.description = Set(description);
    }
    if let Some(release) = new_release {
        active.release_date = Set(format_datetime(release));
    }
    if let Some(genre_id) = req.genre_id {
        active.genre_id = Set(genre_id);
    }
    if let Some(runtime) = req.runtime {
        active.runtime = Set(Some(runtime));
    }
    if let Some(age_rating) = req.age_rating {
        active.age_rating = Set(age_rating.as_str().to_string());
    }

    if active.is_changed() {
        active.update(&txn).await.map_err(|e| unique_violation(e, DUPLICATE_TITLE))?;
    }
    txn.commit().await?;

    info!(film_id = film_id, user_id = caller_id, "film updated");
    Ok(())
}

/// Deletes a film and its reviews. Returns the film's image filename, if any,
/// so the caller can drop the blob.
pub async fn delete(
    db: &DatabaseConnection,
    caller_id: i32,
    film_id: i32,
) -> AppResult<Option<String>> {
    let txn = db.begin().await?;
    let film = find_film(&txn, film_id).await?;

    if film.director_id != caller_id {
        warn!(film_id = film_id, user_id = caller_id, rule = "director_only", "film delete rejected");
        return Err(AppError::forbidden("only the director may delete a film"));
    }

    film_review::Entity::delete_many()
        .filter(film_review::Column::FilmId.eq(film_id))
        .exec(&txn)
        .await?;
    film::Entity::delete_by_id(film_id).exec(&txn).await?;
    txn.commit().await?;

    info!(film_id = film_id, user_id = caller_id, "film deleted");
    Ok(film.image_filename)
}

async fn title_taken<C: ConnectionTrait>(
    db: &C,
    title: &str,
    except: Option<i32>,
) -> AppResult<bool> {
    let mut select = film::Entity::find().filter(film::Column::Title.eq(title));
    if let Some(id) = except {
        select = select.filter(film::Column::Id.ne(id));
    }
    Ok(select.count(db).await? > 0)
}

/// First and last names keyed by user id.
pub async fn user_names<C: ConnectionTrait>(
    db: &C,
    ids: &[i32],
) -> AppResult<HashMap<i32, (String, String)>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<(i32, String, String)> = user::Entity::find()
        .select_only()
        .columns([user::Column::Id, user::Column::FirstName, user::Column::LastName])
        .filter(user::Column::Id.is_in(ids.iter().copied()))
        .into_tuple()
        .all(db)
        .await?;
    Ok(rows.into_iter().map(|(id, first, last)| (id, (first, last))).collect())
}

async fn ratings_for<C: ConnectionTrait>(
    db: &C,
    film_ids: &[i32],
) -> AppResult<HashMap<i32, RatingSummary>> {
    if film_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<(i32, i32)> = film_review::Entity::find()
        .select_only()
        .columns([film_review::Column::FilmId, film_review::Column::Rating])
        .filter(film_review::Column::FilmId.is_in(film_ids.iter().copied()))
        .into_tuple()
        .all(db)
        .await?;
    Ok(rating::summarize_by_film(rows))
}

#[cfg(test)]
pub(crate) mod tests {
    use jiff::{ToSpan, civil::date};

    use super::*;
    use crate::{db, reviews, users};

    pub(crate) fn clock() -> DateTime {
        date(2030, 6, 1).at(12, 0, 0, 0)
    }

    pub(crate) fn new_film(title: &str, release: DateTime) -> CreateFilm {
        CreateFilm {
            title: title.to_string(),
            description: format!("{title}, a film"),
            release_date: Some(format_datetime(release)),
            genre_id: 1,
            runtime: Some(100),
            age_rating: Some(AgeRating::M),
        }
    }

    /// Creates a film that releases a day after `clock()`.
    pub(crate) async fn upcoming(db: &DatabaseConnection, director: i32, title: &str) -> i32 {
        create(db, director, new_film(title, clock() + 1.day()), clock()).await.unwrap()
    }

    /// Creates a film and reviews it with `ratings`, one reviewer per rating.
    async fn reviewed(db: &DatabaseConnection, director: i32, title: &str, ratings: &[i32]) -> i32 {
        let id = upcoming(db, director, title).await;
        let later = clock() + 2.days();
        for (n, r) in ratings.iter().enumerate() {
            let reviewer = users::tests::register(db, &format!("{title}-{n}@example.com")).await;
            reviews::create(db, reviewer, id, reviews::tests::review(*r), later).await.unwrap();
        }
        id
    }

    fn search(sort_by: SortBy) -> FilmSearchQuery {
        FilmSearchQuery { sort_by, ..Default::default() }
    }

    fn ids(page: &FilmPage) -> Vec<i32> {
        page.films.iter().map(|f| f.film_id).collect()
    }

    #[tokio::test]
    async fn rating_asc_puts_unrated_first() {
        let db = db::memory().await;
        let director = users::tests::register(&db, "dir@example.com").await;
        let a = reviewed(&db, director, "A", &[4, 5]).await;
        let b = reviewed(&db, director, "B", &[]).await;
        let c = reviewed(&db, director, "C", &[2]).await;

        let page = list(&db, &search(SortBy::RatingAsc)).await.unwrap();
        assert_eq!(ids(&page), vec![b, c, a]);
        assert_eq!(page.count, 3);
        assert_eq!(page.films[2].rating, 4.5);

        let page = list(&db, &search(SortBy::RatingDesc)).await.unwrap();
        assert_eq!(ids(&page), vec![a, c, b]);
    }

    #[tokio::test]
    async fn pagination_slices_after_sorting() {
        let db = db::memory().await;
        let director = users::tests::register(&db, "dir@example.com").await;
        for title in ["Delta", "Alpha", "Echo", "Bravo", "Charlie"] {
            upcoming(&db, director, title).await;
        }

        let mut params = search(SortBy::AlphabeticalAsc);
        params.start_index = Some(1);
        params.count = Some(2);
        let page = list(&db, &params).await.unwrap();
        let titles: Vec<&str> = page.films.iter().map(|f| f.title.as_str()).collect();
        assert_eq!(titles, vec!["Bravo", "Charlie"]);
        assert_eq!(page.count, 5);

        params.start_index = Some(10);
        let page = list(&db, &params).await.unwrap();
        assert!(page.films.is_empty());
        assert_eq!(page.count, 5);
    }

    #[tokio::test]
    async fn filters_by_reviewer_once_per_film() {
        let db = db::memory().await;
        let director = users::tests::register(&db, "dir@example.com").await;
        let critic = users::tests::register(&db, "critic@example.com").await;
        let seen = upcoming(&db, director, "Seen").await;
        upcoming(&db, director, "Unseen").await;

        let later = clock() + 2.days();
        for r in [3, 7] {
            reviews::create(&db, critic, seen, reviews::tests::review(r), later).await.unwrap();
        }

        let params = FilmSearchQuery { reviewer_id: Some(critic), ..Default::default() };
        let page = list(&db, &params).await.unwrap();
        assert_eq!(ids(&page), vec![seen]);
        assert_eq!(page.films[0].rating, 5.0);
    }

    #[tokio::test]
    async fn filters_by_text_rating_and_genre() {
        let db = db::memory().await;
        let director = users::tests::register(&db, "dir@example.com").await;
        let mut kids = new_film("Paddington", clock() + 1.day());
        kids.age_rating = Some(AgeRating::G);
        kids.genre_id = 8;
        let kids = create(&db, director, kids, clock()).await.unwrap();
        upcoming(&db, director, "Heat").await;

        let params = FilmSearchQuery { q: Some("PADDING".into()), ..Default::default() };
        assert_eq!(ids(&list(&db, &params).await.unwrap()), vec![kids]);

        let params = FilmSearchQuery { age_ratings: vec![AgeRating::G], ..Default::default() };
        assert_eq!(ids(&list(&db, &params).await.unwrap()), vec![kids]);

        let params = FilmSearchQuery { genre_ids: vec![8, 1], ..Default::default() };
        assert_eq!(list(&db, &params).await.unwrap().count, 2);

        let params = FilmSearchQuery { genre_ids: vec![8, 999], ..Default::default() };
        assert!(matches!(list(&db, &params).await, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn text_search_matches_non_ascii_titles() {
        let db = db::memory().await;
        let director = users::tests::register(&db, "dir@example.com").await;
        let elan = upcoming(&db, director, "Élan Vital").await;
        upcoming(&db, director, "Elan").await;

        let params = FilmSearchQuery { q: Some("Élan".into()), ..Default::default() };
        assert_eq!(ids(&list(&db, &params).await.unwrap()), vec![elan]);

        let params = FilmSearchQuery { q: Some("ÉLAN VITAL".into()), ..Default::default() };
        assert_eq!(ids(&list(&db, &params).await.unwrap()), vec![elan]);

        let params = FilmSearchQuery { q: Some("Élan vital".into()), ..Default::default() };
        assert_eq!(ids(&list(&db, &params).await.unwrap()), vec![elan]);
    }

    #[tokio::test]
    async fn create_applies_defaults() {
        let db = db::memory().await;
        let director = users::tests::register(&db, "dir@example.com").await;
        let req = CreateFilm {
            title: "Defaults".into(),
            description: "Nothing optional".into(),
            release_date: None,
            genre_id: 3,
            runtime: None,
            age_rating: None,
        };
        let id = create(&db, director, req, clock()).await.unwrap();

        let film = find_film(&db, id).await.unwrap();
        assert_eq!(film.runtime, None);
        assert_eq!(film.age_rating, "TBC");
        assert_eq!(film.release_date, format_datetime(clock()));
        assert_eq!(film.director_id, director);
    }

    #[tokio::test]
    async fn create_rejects_duplicates_and_past_releases() {
        let db = db::memory().await;
        let director = users::tests::register(&db, "dir@example.com").await;
        upcoming(&db, director, "Original").await;

        let dup = create(&db, director, new_film("Original", clock() + 1.day()), clock()).await;
        assert!(matches!(dup, Err(AppError::Forbidden(_))));

        let past = create(&db, director, new_film("Late", clock() - 1.day()), clock()).await;
        assert!(matches!(past, Err(AppError::Forbidden(_))));

        let mut bad_genre = new_film("Nowhere", clock() + 1.day());
        bad_genre.genre_id = 999;
        let res = create(&db, director, bad_genre, clock()).await;
        assert!(matches!(res, Err(AppError::InvalidInput(_))));

        assert_eq!(film::Entity::find().count(&db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn edit_enforces_director_and_lifecycle() {
        let db = db::memory().await;
        let director = users::tests::register(&db, "dir@example.com").await;
        let stranger = users::tests::register(&db, "x@example.com").await;
        let id = upcoming(&db, director, "Draft").await;
        let rename = |t: &str| EditFilm { title: Some(t.to_string()), ..Default::default() };

        let res = edit(&db, stranger, id, rename("Stolen"), clock()).await;
        assert!(matches!(res, Err(AppError::Forbidden(_))));

        let back_dated =
            EditFilm { release_date: Some(format_datetime(clock() - 1.hour())), ..Default::default() };
        let res = edit(&db, director, id, back_dated, clock()).await;
        assert!(matches!(res, Err(AppError::Forbidden(_))));

        edit(&db, director, id, rename("Final Cut"), clock()).await.unwrap();
        assert_eq!(find_film(&db, id).await.unwrap().title, "Final Cut");

        // Resubmitting the film's own title is not a collision.
        edit(&db, director, id, rename("Final Cut"), clock()).await.unwrap();

        let res = edit(&db, director, id, EditFilm::default(), clock() + 2.days()).await;
        assert!(matches!(res, Err(AppError::Forbidden(_))));

        let res = edit(&db, director, 4242, rename("Ghost"), clock()).await;
        assert!(matches!(res, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn edit_rejects_title_of_another_film() {
        let db = db::memory().await;
        let director = users::tests::register(&db, "dir@example.com").await;
        upcoming(&db, director, "Taken").await;
        let id = upcoming(&db, director, "Mine").await;

        let req = EditFilm { title: Some("Taken".into()), ..Default::default() };
        let res = edit(&db, director, id, req, clock()).await;
        assert!(matches!(res, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn reviewed_film_is_frozen() {
        let db = db::memory().await;
        let director = users::tests::register(&db, "dir@example.com").await;
        let id = upcoming(&db, director, "Frozen").await;
        let critic = users::tests::register(&db, "critic@example.com").await;
        reviews::create(&db, critic, id, reviews::tests::review(6), clock() + 2.days())
            .await
            .unwrap();

        let req = EditFilm { runtime: Some(90), ..Default::default() };
        let res = edit(&db, director, id, req, clock()).await;
        assert!(matches!(res, Err(AppError::Forbidden(_))));
        assert_eq!(find_film(&db, id).await.unwrap().runtime, Some(100));
    }

    #[tokio::test]
    async fn delete_is_director_only_and_removes_reviews() {
        let db = db::memory().await;
        let director = users::tests::register(&db, "dir@example.com").await;
        let critic = users::tests::register(&db, "critic@example.com").await;
        let id = upcoming(&db, director, "Doomed").await;
        reviews::create(&db, critic, id, reviews::tests::review(6), clock() + 2.days())
            .await
            .unwrap();

        assert!(matches!(delete(&db, critic, id).await, Err(AppError::Forbidden(_))));
        assert_eq!(delete(&db, director, id).await.unwrap(), None);
        assert!(matches!(detail(&db, id).await, Err(AppError::NotFound(_))));
        assert_eq!(film_review::Entity::find().count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn detail_includes_count_and_is_stable() {
        let db = db::memory().await;
        let director = users::tests::register(&db, "dir@example.com").await;
        let id = reviewed(&db, director, "Steady", &[2, 3, 3]).await;

        let first = detail(&db, id).await.unwrap();
        assert_eq!(first.num_reviews, 3);
        assert_eq!(first.rating, 2.67);
        assert_eq!(first.director_first_name, "Test");
        assert_eq!(detail(&db, id).await.unwrap(), first);
    }

    #[tokio::test]
    async fn genres_are_seeded() {
        let db = db::memory().await;
        let all = genres(&db).await.unwrap();
        assert_eq!(all.len(), 18);
        assert_eq!(all[0].genre_id, 1);
        assert_eq!(all[0].name, "Action");
    }
}
