use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "film")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub title: String,
    pub description: String,
    /// Civil date-time, `YYYY-MM-DDTHH:MM:SS`.
    pub release_date: String,
    pub image_filename: Option<String>,
    pub runtime: Option<i32>,
    pub director_id: i32,
    pub genre_id: i32,
    pub age_rating: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
