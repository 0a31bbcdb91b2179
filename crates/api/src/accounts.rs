//! User administration, self-registration and role-group management.

use chrono::Utc;
use entity::{cart, cart_line, customer_order, purchase, rating, user, user_role};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::directory::{self, Role, RoleSet};
use crate::error::{ServiceError, ServiceResult};
use crate::permission::{Access, Resource, Verb};

const MAX_USERNAME_LEN: usize = 150;
const MAX_EMAIL_LEN: usize = 320;

#[derive(Clone, Debug)]
pub struct UserView {
    pub user: user::Model,
    pub roles: RoleSet,
}

#[derive(Clone, Debug)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub roles: Vec<Role>,
}

#[derive(Clone, Debug, Default)]
pub struct ProfilePatch {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub is_active: Option<bool>,
}

pub async fn me(db: &DatabaseConnection, access: &Access) -> ServiceResult<UserView> {
    let id = access.identity()?;
    get_user(db, access, id).await
}

pub async fn get_user(
    db: &DatabaseConnection,
    access: &Access,
    id: Uuid,
) -> ServiceResult<UserView> {
    let view = load(db, id).await?;
    access.require(Verb::Read, &profile(&view))?;
    Ok(view)
}

pub async fn list_users(db: &DatabaseConnection, access: &Access) -> ServiceResult<Vec<UserView>> {
    access.require(Verb::List, &Resource::Users)?;
    let users = user::Entity::find()
        .order_by_asc(user::Column::Username)
        .all(db)
        .await?;
    attach_roles(db, users).await
}

/// Members of one role group, excluding anyone who also holds a higher role.
pub async fn list_role_members(
    db: &DatabaseConnection,
    access: &Access,
    role: Role,
) -> ServiceResult<Vec<UserView>> {
    access.require(Verb::List, &Resource::RoleGroup { group: role })?;
    let users = directory::list_by_role(db, role, &directory::higher_roles(role)).await?;
    attach_roles(db, users).await
}

/// Staff-created account. Each initial role is checked like a separate grant.
pub async fn create_user(
    db: &DatabaseConnection,
    access: &Access,
    input: NewUser,
) -> ServiceResult<UserView> {
    access.require(Verb::Create, &Resource::Users)?;
    for role in &input.roles {
        access.require(Verb::Create, &Resource::RoleGroup { group: *role })?;
    }
    let roles: RoleSet = input.roles.iter().copied().collect();
    insert_account(db, input, roles).await
}

/// Self-registration. The new account holds exactly the Customer role.
pub async fn sign_up(
    db: &DatabaseConnection,
    access: &Access,
    input: NewUser,
) -> ServiceResult<UserView> {
    access.require(Verb::Create, &Resource::Signup)?;
    let roles = RoleSet::EMPTY.with(Role::Customer);
    insert_account(db, input, roles).await
}

pub async fn update_user(
    db: &DatabaseConnection,
    access: &Access,
    id: Uuid,
    patch: ProfilePatch,
) -> ServiceResult<UserView> {
    let email = patch.email.as_deref().map(clean_email).transpose()?;
    let display_name = patch
        .display_name
        .as_deref()
        .map(clean_display_name)
        .transpose()?;
    let view = load(db, id).await?;
    access.require(Verb::Update, &profile(&view))?;

    let roles = view.roles;
    let mut active: user::ActiveModel = view.user.into();
    if let Some(email) = email {
        active.email = Set(email);
    }
    if let Some(display_name) = display_name {
        active.display_name = Set(display_name);
    }
    if let Some(is_active) = patch.is_active {
        active.is_active = Set(is_active);
    }
    active.updated_at = Set(Utc::now().into());
    let user = active.update(db).await?;
    Ok(UserView { user, roles })
}

/// Refuses while the user has purchase history; other owned rows go with them.
pub async fn delete_user(db: &DatabaseConnection, access: &Access, id: Uuid) -> ServiceResult<()> {
    let view = load(db, id).await?;
    access.require(Verb::Delete, &profile(&view))?;
    let span = info_span!("restaurant.accounts.delete_user", user = %id);
    async move {
        let txn = db.begin().await?;
        let purchases = purchase::Entity::find()
            .filter(purchase::Column::UserId.eq(id))
            .count(&txn)
            .await?;
        if purchases > 0 {
            return Err(ServiceError::invalid_state(
                "user has purchase history and cannot be deleted",
            ));
        }
        customer_order::Entity::update_many()
            .col_expr(
                customer_order::Column::DeliveryCrewId,
                Expr::value(None::<Uuid>),
            )
            .filter(customer_order::Column::DeliveryCrewId.eq(id))
            .exec(&txn)
            .await?;
        cart_line::Entity::delete_many()
            .filter(cart_line::Column::UserId.eq(id))
            .exec(&txn)
            .await?;
        cart::Entity::delete_many()
            .filter(cart::Column::UserId.eq(id))
            .exec(&txn)
            .await?;
        rating::Entity::delete_many()
            .filter(rating::Column::UserId.eq(id))
            .exec(&txn)
            .await?;
        user_role::Entity::delete_many()
            .filter(user_role::Column::UserId.eq(id))
            .exec(&txn)
            .await?;
        user::Entity::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;
        info!("user deleted");
        Ok(())
    }
    .instrument(span)
    .await
}

pub async fn grant_role(
    db: &DatabaseConnection,
    access: &Access,
    user_id: Uuid,
    role: Role,
) -> ServiceResult<UserView> {
    access.require(Verb::Create, &Resource::RoleGroup { group: role })?;
    let span = info_span!(
        "restaurant.roles.grant",
        user = %user_id,
        role = directory::role_name(role)
    );
    async move {
        let txn = db.begin().await?;
        let target = guard_target(&txn, access, user_id).await?;
        directory::grant(&txn, user_id, role).await?;
        txn.commit().await?;
        info!("role granted");
        Ok(UserView {
            user: target.user,
            roles: target.roles.with(role),
        })
    }
    .instrument(span)
    .await
}

pub async fn revoke_role(
    db: &DatabaseConnection,
    access: &Access,
    user_id: Uuid,
    role: Role,
) -> ServiceResult<UserView> {
    access.require(Verb::Delete, &Resource::RoleGroup { group: role })?;
    let span = info_span!(
        "restaurant.roles.revoke",
        user = %user_id,
        role = directory::role_name(role)
    );
    async move {
        let txn = db.begin().await?;
        let target = guard_target(&txn, access, user_id).await?;
        directory::revoke(&txn, user_id, role).await?;
        let roles = directory::roles_of(&txn, user_id).await?;
        txn.commit().await?;
        info!("role revoked");
        Ok(UserView {
            user: target.user,
            roles,
        })
    }
    .instrument(span)
    .await
}

/// Only a SysAdmin may change the roles of another SysAdmin.
async fn guard_target<C>(conn: &C, access: &Access, user_id: Uuid) -> ServiceResult<UserView>
where
    C: ConnectionTrait,
{
    let target = load(conn, user_id).await?;
    if target.roles.contains(Role::SysAdmin) && !access.roles().contains(Role::SysAdmin) {
        return Err(ServiceError::invalid_state(
            "only a system administrator can change another administrator's roles",
        ));
    }
    Ok(target)
}

async fn insert_account(
    db: &DatabaseConnection,
    input: NewUser,
    roles: RoleSet,
) -> ServiceResult<UserView> {
    let username = clean_username(&input.username)?;
    let email = clean_email(&input.email)?;
    let display_name = match input.display_name.as_deref() {
        Some(value) if !value.trim().is_empty() => clean_display_name(value)?,
        _ => username.clone(),
    };
    let span = info_span!("restaurant.accounts.create", username = %username);
    async move {
        let txn = db.begin().await?;
        let taken = user::Entity::find()
            .filter(user::Column::Username.eq(username.as_str()))
            .count(&txn)
            .await?;
        if taken > 0 {
            return Err(ServiceError::conflict(format!(
                "username \"{username}\" is already taken"
            )));
        }
        let now: DateTimeWithTimeZone = Utc::now().into();
        let created = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            username: Set(username),
            email: Set(email),
            display_name: Set(display_name),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;
        for role in roles.iter() {
            directory::grant(&txn, created.id, role).await?;
        }
        txn.commit().await?;
        info!(user = %created.id, "account created");
        Ok(UserView {
            user: created,
            roles,
        })
    }
    .instrument(span)
    .await
}

async fn load<C>(conn: &C, id: Uuid) -> ServiceResult<UserView>
where
    C: ConnectionTrait,
{
    let user = user::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or(ServiceError::NotFound("user"))?;
    let roles = directory::roles_of(conn, id).await?;
    Ok(UserView { user, roles })
}

async fn attach_roles(
    db: &DatabaseConnection,
    users: Vec<user::Model>,
) -> ServiceResult<Vec<UserView>> {
    let ids: Vec<Uuid> = users.iter().map(|u| u.id).collect();
    let role_map = directory::roles_for_users(db, &ids).await?;
    Ok(users
        .into_iter()
        .map(|user| UserView {
            roles: role_map.get(&user.id).copied().unwrap_or_default(),
            user,
        })
        .collect())
}

fn profile(view: &UserView) -> Resource {
    Resource::Profile {
        owner: view.user.id,
        owner_roles: view.roles,
    }
}

fn clean_username(value: &str) -> ServiceResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::invalid("username", "is required"));
    }
    if trimmed.chars().count() > MAX_USERNAME_LEN {
        return Err(ServiceError::invalid(
            "username",
            format!("must be at most {MAX_USERNAME_LEN} characters"),
        ));
    }
    let valid = trimmed
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'));
    if !valid {
        return Err(ServiceError::invalid(
            "username",
            "may only contain letters, digits and @/./+/-/_",
        ));
    }
    Ok(trimmed.to_string())
}

fn clean_email(value: &str) -> ServiceResult<String> {
    let trimmed = value.trim().to_lowercase();
    if trimmed.is_empty() || !trimmed.contains('@') {
        return Err(ServiceError::invalid("email", "is not a valid address"));
    }
    if trimmed.len() > MAX_EMAIL_LEN {
        return Err(ServiceError::invalid(
            "email",
            format!("must be at most {MAX_EMAIL_LEN} characters"),
        ));
    }
    Ok(trimmed)
}

fn clean_display_name(value: &str) -> ServiceResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::invalid("displayName", "is required"));
    }
    if trimmed.chars().count() > MAX_USERNAME_LEN {
        return Err(ServiceError::invalid(
            "displayName",
            format!("must be at most {MAX_USERNAME_LEN} characters"),
        ));
    }
    Ok(trimmed.to_string())
}
