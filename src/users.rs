use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, Set, TransactionTrait,
};
use tracing::{info, warn};

use crate::{
    auth::{self, AuthUser},
    entities::user,
    error::{AppError, AppResult, unique_violation},
    models::{LoginRequest, LoginResponse, RegisterUser, UpdateUser, UserView},
};

const EMAIL_IN_USE: &str = "email already in use";

pub async fn find_user<C: ConnectionTrait>(db: &C, user_id: i32) -> AppResult<user::Model> {
    user::Entity::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::not_found(format!("no user with id {user_id}")))
}

async fn email_taken<C: ConnectionTrait>(db: &C, email: &str) -> AppResult<bool> {
    Ok(user::Entity::find().filter(user::Column::Email.eq(email)).count(db).await? > 0)
}

pub async fn register(db: &DatabaseConnection, req: RegisterUser) -> AppResult<i32> {
    req.validate()?;
    let password = auth::hash_password(&req.password)?;

    let txn = db.begin().await?;
    if email_taken(&txn, &req.email).await? {
        warn!(email = %req.email, rule = "unique_email", "registration rejected");
        return Err(AppError::forbidden(EMAIL_IN_USE));
    }

    let inserted = user::Entity::insert(user::ActiveModel {
        id: Default::default(),
        email: Set(req.email),
        first_name: Set(req.first_name),
        last_name: Set(req.last_name),
        password: Set(password),
        image_filename: Set(None),
    })
    .exec(&txn)
    .await
    .map_err(|e| unique_violation(e, EMAIL_IN_USE))?;
    txn.commit().await?;

    info!(user_id = inserted.last_insert_id, "user registered");
    Ok(inserted.last_insert_id)
}

pub async fn login(db: &DatabaseConnection, req: LoginRequest) -> AppResult<LoginResponse> {
    req.validate()?;

    let found = user::Entity::find().filter(user::Column::Email.eq(req.email.as_str())).one(db).await?;
    let Some(found) = found else {
        warn!(email = %req.email, rule = "known_email", "login rejected");
        return Err(AppError::Unauthenticated);
    };
    if !auth::verify_password(&req.password, &found.password) {
        warn!(user_id = found.id, rule = "password_match", "login rejected");
        return Err(AppError::Unauthenticated);
    }

    let token = auth::issue_session(db, found.id).await?;
    info!(user_id = found.id, "user logged in");
    Ok(LoginResponse { user_id: found.id, token })
}

pub async fn logout(db: &DatabaseConnection, caller: &AuthUser) -> AppResult<()> {
    if !auth::revoke_session(db, &caller.token).await? {
        return Err(AppError::Unauthenticated);
    }
    info!(user_id = caller.user_id, "user logged out");
    Ok(())
}

/// Public profile; the email is only shown to the user themselves.
pub async fn view(
    db: &DatabaseConnection,
    user_id: i32,
    caller: Option<&AuthUser>,
) -> AppResult<UserView> {
    let found = find_user(db, user_id).await?;
    let is_self = caller.is_some_and(|c| c.owns(user_id));
    Ok(UserView {
        email: is_self.then_some(found.email),
        first_name: found.first_name,
        last_name: found.last_name,
    })
}

pub async fn update(
    db: &DatabaseConnection,
    caller: &AuthUser,
    user_id: i32,
    req: UpdateUser,
) -> AppResult<()> {
    req.validate()?;
    if req.password.is_some() && req.password == req.current_password {
        warn!(user_id = user_id, rule = "new_password_differs", "user update rejected");
        return Err(AppError::forbidden("new password must differ from the current one"));
    }

    let txn = db.begin().await?;
    let found = find_user(&txn, user_id).await?;

    if !caller.owns(user_id) {
        warn!(user_id = user_id, caller_id = caller.user_id, rule = "self_only", "user update rejected");
        return Err(AppError::forbidden("cannot edit another user"));
    }
    if let Some(email) = &req.email {
        if *email != found.email && email_taken(&txn, email).await? {
            warn!(user_id = user_id, rule = "unique_email", "user update rejected");
            return Err(AppError::forbidden(EMAIL_IN_USE));
        }
    }

    let new_password = match (&req.password, &req.current_password) {
        (Some(password), Some(current)) => {
            if !auth::verify_password(current, &found.password) {
                warn!(user_id = user_id, rule = "current_password_match", "user update rejected");
                return Err(AppError::Unauthenticated);
            }
            Some(auth::hash_password(password)?)
        },
        _ => None,
    };

    let mut active: user::ActiveModel = found.into();
    if let Some(email) = req.email {
        active.email = Set(email);
    }
    if let Some(first_name) = req.first_name {
        active.first_name = Set(first_name);
    }
    if let Some(last_name) = req.last_name {
        active.last_name = Set(last_name);
    }
    if let Some(password) = new_password {
        active.password = Set(password);
    }

    if active.is_changed() {
        active.update(&txn).await.map_err(|e| unique_violation(e, EMAIL_IN_USE))?;
    }
    txn.commit().await?;

    info!(user_id = user_id, "user updated");
    Ok(())
}
