use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(User::Table)
                    .if_not_exists()
                    .col(pk_auto(User::Id))
                    .col(string(User::Email).unique_key())
                    .col(string(User::FirstName))
                    .col(string(User::LastName))
                    .col(string(User::Password))
                    .col(string_null(User::ImageFilename))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Session::Table)
                    .if_not_exists()
                    .col(string(Session::Token).primary_key())
                    .col(integer(Session::UserId).unique_key())
                    .col(big_integer(Session::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_session_user")
                            .from(Session::Table, Session::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Genre::Table)
                    .if_not_exists()
                    .col(pk_auto(Genre::Id))
                    .col(string(Genre::Name))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Film::Table)
                    .if_not_exists()
                    .col(pk_auto(Film::Id))
                    .col(string(Film::Title).unique_key())
                    .col(string(Film::Description))
                    .col(string(Film::ReleaseDate))
                    .col(string_null(Film::ImageFilename))
                    .col(integer_null(Film::Runtime))
                    .col(integer(Film::DirectorId))
                    .col(integer(Film::GenreId))
                    .col(string(Film::AgeRating).default("TBC"))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_film_director")
                            .from(Film::Table, Film::DirectorId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_film_genre")
                            .from(Film::Table, Film::GenreId)
                            .to(Genre::Table, Genre::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_film_release_date")
                    .table(Film::Table)
                    .col(Film::ReleaseDate)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FilmReview::Table)
                    .if_not_exists()
                    .col(pk_auto(FilmReview::Id))
                    .col(integer(FilmReview::FilmId))
                    .col(integer(FilmReview::UserId))
                    .col(integer(FilmReview::Rating))
                    .col(string_null(FilmReview::Review))
                    .col(string(FilmReview::Timestamp))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_film_review_film")
                            .from(FilmReview::Table, FilmReview::FilmId)
                            .to(Film::Table, Film::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_film_review_user")
                            .from(FilmReview::Table, FilmReview::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_film_review_film")
                    .table(FilmReview::Table)
                    .col(FilmReview::FilmId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_film_review_user")
                    .table(FilmReview::Table)
                    .col(FilmReview::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(FilmReview::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Film::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Genre::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Session::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(User::Table).to_owned()).await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum User {
    Table,
    Id,
    Email,
    FirstName,
    LastName,
    Password,
    ImageFilename,
}

#[derive(DeriveIden)]
enum Session {
    Table,
    Token,
    UserId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Genre {
    Table,
    Id,
    Name,
}

#[derive(DeriveIden)]
enum Film {
    Table,
    Id,
    Title,
    Description,
    ReleaseDate,
    ImageFilename,
    Runtime,
    DirectorId,
    GenreId,
    AgeRating,
}

#[derive(DeriveIden)]
enum FilmReview {
    Table,
    Id,
    FilmId,
    UserId,
    Rating,
    Review,
    Timestamp,
}
