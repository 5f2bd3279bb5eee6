use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use sea_orm::{ActiveModelTrait, DatabaseConnection, Set, TransactionTrait};
use tracing::{info, warn};

use crate::{
    auth::AuthUser,
    entities::{film, user},
    error::{AppError, AppResult},
    films, users,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ImageType {
    Png,
    Jpeg,
    Gif,
}

impl ImageType {
    pub fn from_content_type(value: &str) -> Option<Self> {
        let mime = value.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
        match mime.as_str() {
            "image/png" => Some(ImageType::Png),
            "image/jpeg" => Some(ImageType::Jpeg),
            "image/gif" => Some(ImageType::Gif),
            _ => None,
        }
    }

    pub fn from_filename(name: &str) -> Option<Self> {
        match Path::new(name).extension()?.to_str()? {
            "png" => Some(ImageType::Png),
            "jpeg" | "jpg" => Some(ImageType::Jpeg),
            "gif" => Some(ImageType::Gif),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageType::Png => "png",
            ImageType::Jpeg => "jpeg",
            ImageType::Gif => "gif",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ImageType::Png => "image/png",
            ImageType::Jpeg => "image/jpeg",
            ImageType::Gif => "image/gif",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ImageOwner {
    Film,
    User,
}

impl ImageOwner {
    pub fn filename(self, id: i32, kind: ImageType) -> String {
        let prefix = match self {
            ImageOwner::Film => "film",
            ImageOwner::User => "user",
        };
        format!("{prefix}_{id}.{}", kind.extension())
    }
}

/// Whether setting an image replaced an existing one.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ImageOutcome {
    Created,
    Updated,
}

/// Image blobs on disk, keyed by derived filename.
#[derive(Clone, Debug)]
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub async fn ensure_dir(&self) -> AppResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    fn path(&self, name: &str) -> AppResult<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(anyhow::anyhow!("refusing image filename {name:?}").into());
        }
        Ok(self.dir.join(name))
    }

    pub async fn write(&self, name: &str, bytes: &[u8]) -> AppResult<()> {
        tokio::fs::write(self.path(name)?, bytes).await?;
        Ok(())
    }

    pub async fn read(&self, name: &str) -> AppResult<Vec<u8>> {
        match tokio::fs::read(self.path(name)?).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(file = %name, "image referenced but missing on disk");
                Err(AppError::not_found("image not found"))
            },
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, name: &str) -> AppResult<()> {
        match tokio::fs::remove_file(self.path(name)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn load(&self, name: Option<String>) -> AppResult<(ImageType, Vec<u8>)> {
        let name = name.ok_or_else(|| AppError::not_found("no image set"))?;
        let kind = ImageType::from_filename(&name)
            .ok_or_else(|| anyhow::anyhow!("stored image {name} has unknown type"))?;
        Ok((kind, self.read(&name).await?))
    }

    /// Removes a blob the database no longer references. Failures are only logged.
    pub async fn discard(&self, name: &str) {
        if let Err(err) = self.remove(name).await {
            warn!(file = %name, error = %err, "failed to remove stale image");
        }
    }

    /// Writes the new blob. The previous one, if named differently, is left for
    /// the caller to discard once the new name is committed.
    async fn put(
        &self,
        owner: ImageOwner,
        id: i32,
        previous: Option<&str>,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> AppResult<(String, ImageOutcome)> {
        let kind = content_type.and_then(ImageType::from_content_type).ok_or_else(|| {
            AppError::invalid("image must be image/png, image/jpeg or image/gif")
        })?;
        if bytes.is_empty() {
            return Err(AppError::invalid("image body is empty"));
        }

        let name = owner.filename(id, kind);
        self.write(&name, bytes).await?;

        let outcome = if previous.is_some() { ImageOutcome::Updated } else { ImageOutcome::Created };
        Ok((name, outcome))
    }
}

pub async fn film_image(
    db: &DatabaseConnection,
    store: &ImageStore,
    film_id: i32,
) -> AppResult<(ImageType, Vec<u8>)> {
    let found = films::find_film(db, film_id).await?;
    store.load(found.image_filename).await
}

/// Sets a film's hero image. Director only.
pub async fn set_film_image(
    db: &DatabaseConnection,
    store: &ImageStore,
    caller: &AuthUser,
    film_id: i32,
    content_type: Option<&str>,
    bytes: &[u8],
) -> AppResult<ImageOutcome> {
    let txn = db.begin().await?;
    let found = films::find_film(&txn, film_id).await?;
    if !caller.owns(found.director_id) {
        warn!(film_id = film_id, user_id = caller.user_id, rule = "director_only", "film image rejected");
        return Err(AppError::forbidden("only the director may set the film image"));
    }

    let previous = found.image_filename.clone();
    let (name, outcome) =
        store.put(ImageOwner::Film, film_id, previous.as_deref(), content_type, bytes).await?;

    let mut active: film::ActiveModel = found.into();
    active.image_filename = Set(Some(name.clone()));
    active.update(&txn).await?;
    txn.commit().await?;

    if let Some(stale) = previous.filter(|old| *old != name) {
        store.discard(&stale).await;
    }
    info!(film_id = film_id, outcome = ?outcome, "film image stored");
    Ok(outcome)
}

pub async fn user_image(
    db: &DatabaseConnection,
    store: &ImageStore,
    user_id: i32,
) -> AppResult<(ImageType, Vec<u8>)> {
    let found = users::find_user(db, user_id).await?;
    store.load(found.image_filename).await
}

/// Sets a user's profile image. Self only.
pub async fn set_user_image(
    db: &DatabaseConnection,
    store: &ImageStore,
    caller: &AuthUser,
    user_id: i32,
    content_type: Option<&str>,
    bytes: &[u8],
) -> AppResult<ImageOutcome> {
    let txn = db.begin().await?;
    let found = users::find_user(&txn, user_id).await?;
    if !caller.owns(user_id) {
        warn!(user_id = user_id, caller_id = caller.user_id, rule = "self_only", "user image rejected");
        return Err(AppError::forbidden("cannot change another user's image"));
    }

    let previous = found.image_filename.clone();
    let (name, outcome) =
        store.put(ImageOwner::User, user_id, previous.as_deref(), content_type, bytes).await?;

    let mut active: user::ActiveModel = found.into();
    active.image_filename = Set(Some(name.clone()));
    active.update(&txn).await?;
    txn.commit().await?;

    if let Some(stale) = previous.filter(|old| *old != name) {
        store.discard(&stale).await;
    }
    info!(user_id = user_id, outcome = ?outcome, "user image stored");
    Ok(outcome)
}

pub async fn delete_user_image(
    db: &DatabaseConnection,
    store: &ImageStore,
    caller: &AuthUser,
    user_id: i32,
) -> AppResult<()> {
    let txn = db.begin().await?;
    let found = users::find_user(&txn, user_id).await?;
    if !caller.owns(user_id) {
        warn!(user_id = user_id, caller_id = caller.user_id, rule = "self_only", "user image delete rejected");
        return Err(AppError::forbidden("cannot delete another user's image"));
    }

    let Some(previous) = found.image_filename.clone() else {
        return Ok(());
    };
    let mut active: user::ActiveModel = found.into();
    active.image_filename = Set(None);
    active.update(&txn).await?;
    txn.commit().await?;

    store.discard(&previous).await;
    info!(user_id = user_id, "user image removed");
    Ok(())
}
