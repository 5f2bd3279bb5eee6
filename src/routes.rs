use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::{Query, WithRejection};

use crate::{
    AppState,
    auth::{AUTH_HEADER, AuthUser, MaybeAuthUser},
    error::{AppError, AppResult},
    films,
    images::{self, ImageOutcome, ImageType},
    models::{
        CreateFilm, CreateReview, CreatedFilm, EditFilm, FilmDetail, FilmPage, FilmSearchQuery,
        GenreView, LoginRequest, RegisterUser, ReviewView, UpdateUser, UserCreated, UserView, now,
    },
    reviews, users,
};

type Id = WithRejection<Path<i32>, AppError>;
type Body<T> = WithRejection<Json<T>, AppError>;

pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_image_bytes;
    Router::new()
        .route("/films", get(list_films).post(create_film))
        .route("/films/genres", get(genres))
        .route("/films/{id}", get(get_film).patch(edit_film).delete(delete_film))
        .route("/films/{id}/reviews", get(list_reviews).post(create_review))
        .route("/films/{id}/image", get(get_film_image).put(set_film_image).post(set_film_image))
        .route("/users/register", post(register))
        .route("/users/login", post(login))
        .route("/users/logout", post(logout))
        .route("/users/{id}", get(get_user).patch(update_user))
        .route(
            "/users/{id}/image",
            get(get_user_image).put(set_user_image).patch(set_user_image).delete(delete_user_image),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

pub async fn list_films(
    State(state): State<Arc<AppState>>,
    WithRejection(Query(params), _): WithRejection<Query<FilmSearchQuery>, AppError>,
) -> AppResult<Json<FilmPage>> {
    Ok(Json(films::list(&state.db, &params).await?))
}

pub async fn get_film(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(id), _): Id,
) -> AppResult<Json<FilmDetail>> {
    Ok(Json(films::detail(&state.db, id).await?))
}

pub async fn create_film(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    WithRejection(Json(req), _): Body<CreateFilm>,
) -> AppResult<(StatusCode, Json<CreatedFilm>)> {
    let film_id = films::create(&state.db, caller.user_id, req, now()).await?;
    Ok((StatusCode::CREATED, Json(CreatedFilm { film_id })))
}

pub async fn edit_film(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(id), _): Id,
    caller: AuthUser,
    WithRejection(Json(req), _): Body<EditFilm>,
) -> AppResult<StatusCode> {
    films::edit(&state.db, caller.user_id, id, req, now()).await?;
    Ok(StatusCode::OK)
}

pub async fn delete_film(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(id), _): Id,
    caller: AuthUser,
) -> AppResult<StatusCode> {
    if let Some(image) = films::delete(&state.db, caller.user_id, id).await? {
        state.images.discard(&image).await;
    }
    Ok(StatusCode::OK)
}

pub async fn genres(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<GenreView>>> {
    Ok(Json(films::genres(&state.db).await?))
}

pub async fn list_reviews(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(id), _): Id,
) -> AppResult<Json<Vec<ReviewView>>> {
    Ok(Json(reviews::list(&state.db, id).await?))
}

pub async fn create_review(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(id), _): Id,
    caller: AuthUser,
    WithRejection(Json(req), _): Body<CreateReview>,
) -> AppResult<StatusCode> {
    reviews::create(&state.db, caller.user_id, id, req, now()).await?;
    Ok(StatusCode::CREATED)
}

pub async fn get_film_image(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(id), _): Id,
) -> AppResult<Response> {
    let (kind, bytes) = images::film_image(&state.db, &state.images, id).await?;
    Ok(image_response(kind, bytes))
}

pub async fn set_film_image(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(id), _): Id,
    caller: AuthUser,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<StatusCode> {
    let outcome = images::set_film_image(
        &state.db,
        &state.images,
        &caller,
        id,
        content_type(&headers),
        &body,
    )
    .await?;
    Ok(outcome_status(outcome))
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    WithRejection(Json(req), _): Body<RegisterUser>,
) -> AppResult<(StatusCode, Json<UserCreated>)> {
    let user_id = users::register(&state.db, req).await?;
    Ok((StatusCode::CREATED, Json(UserCreated { user_id })))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    WithRejection(Json(req), _): Body<LoginRequest>,
) -> AppResult<Response> {
    let resp = users::login(&state.db, req).await?;
    Ok(([(AUTH_HEADER, resp.token.clone())], Json(resp)).into_response())
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
) -> AppResult<StatusCode> {
    users::logout(&state.db, &caller).await?;
    Ok(StatusCode::OK)
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(id), _): Id,
    MaybeAuthUser(caller): MaybeAuthUser,
) -> AppResult<Json<UserView>> {
    Ok(Json(users::view(&state.db, id, caller.as_ref()).await?))
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(id), _): Id,
    caller: AuthUser,
    WithRejection(Json(req), _): Body<UpdateUser>,
) -> AppResult<StatusCode> {
    users::update(&state.db, &caller, id, req).await?;
    Ok(StatusCode::OK)
}

pub async fn get_user_image(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(id), _): Id,
) -> AppResult<Response> {
    let (kind, bytes) = images::user_image(&state.db, &state.images, id).await?;
    Ok(image_response(kind, bytes))
}

pub async fn set_user_image(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(id), _): Id,
    caller: AuthUser,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<StatusCode> {
    let outcome = images::set_user_image(
        &state.db,
        &state.images,
        &caller,
        id,
        content_type(&headers),
        &body,
    )
    .await?;
    Ok(outcome_status(outcome))
}

pub async fn delete_user_image(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(id), _): Id,
    caller: AuthUser,
) -> AppResult<StatusCode> {
    images::delete_user_image(&state.db, &state.images, &caller, id).await?;
    Ok(StatusCode::OK)
}

fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok())
}

fn outcome_status(outcome: ImageOutcome) -> StatusCode {
    match outcome {
        ImageOutcome::Created => StatusCode::CREATED,
        ImageOutcome::Updated => StatusCode::OK,
    }
}

fn image_response(kind: ImageType, bytes: Vec<u8>) -> Response {
    ([(header::CONTENT_TYPE, kind.content_type())], bytes).into_response()
}
