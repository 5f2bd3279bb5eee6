pub mod film;
pub mod film_review;
pub mod genre;
pub mod session;
pub mod user;
