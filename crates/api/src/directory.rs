//! Role Directory: which identities hold which roles.
//!
//! Roles are stored as independent grants but ranked for authorization:
//! SysAdmin outranks Manager, which outranks the DeliveryCrew/Customer peers.

use std::collections::HashMap;

use entity::{user, user_role};
use sea_orm::sea_query::{OnConflict, Query};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, Iterable, QueryFilter,
    QueryOrder,
};
use uuid::Uuid;

pub use entity::user_role::Role;

pub fn priority(role: Role) -> u8 {
    match role {
        Role::SysAdmin => 3,
        Role::Manager => 2,
        Role::DeliveryCrew | Role::Customer => 1,
    }
}

/// Roles ranked strictly above `role`.
pub fn higher_roles(role: Role) -> Vec<Role> {
    Role::iter()
        .filter(|other| priority(*other) > priority(role))
        .collect()
}

pub fn role_name(role: Role) -> &'static str {
    match role {
        Role::SysAdmin => "SYSADMIN",
        Role::Manager => "MANAGER",
        Role::DeliveryCrew => "DELIVERY_CREW",
        Role::Customer => "CUSTOMER",
    }
}

/// Compact set of roles held by one identity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RoleSet(u8);

impl RoleSet {
    pub const EMPTY: RoleSet = RoleSet(0);

    fn bit(role: Role) -> u8 {
        match role {
            Role::SysAdmin => 1,
            Role::Manager => 1 << 1,
            Role::DeliveryCrew => 1 << 2,
            Role::Customer => 1 << 3,
        }
    }

    pub fn with(self, role: Role) -> Self {
        RoleSet(self.0 | Self::bit(role))
    }

    pub fn contains(self, role: Role) -> bool {
        self.0 & Self::bit(role) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Manager or SysAdmin.
    pub fn is_staff(self) -> bool {
        self.contains(Role::SysAdmin) || self.contains(Role::Manager)
    }

    pub fn highest(self) -> Option<Role> {
        self.iter().max_by_key(|role| priority(*role))
    }

    pub fn iter(self) -> impl Iterator<Item = Role> {
        Role::iter().filter(move |role| self.contains(*role))
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<T: IntoIterator<Item = Role>>(iter: T) -> Self {
        iter.into_iter().fold(RoleSet::EMPTY, RoleSet::with)
    }
}

pub async fn has_role<C>(conn: &C, user_id: Uuid, role: Role) -> Result<bool, DbErr>
where
    C: ConnectionTrait,
{
    Ok(user_role::Entity::find_by_id((user_id, role))
        .one(conn)
        .await?
        .is_some())
}

pub async fn roles_of<C>(conn: &C, user_id: Uuid) -> Result<RoleSet, DbErr>
where
    C: ConnectionTrait,
{
    let rows = user_role::Entity::find()
        .filter(user_role::Column::UserId.eq(user_id))
        .all(conn)
        .await?;
    Ok(rows.into_iter().map(|row| row.role).collect())
}

pub async fn roles_for_users<C>(conn: &C, ids: &[Uuid]) -> Result<HashMap<Uuid, RoleSet>, DbErr>
where
    C: ConnectionTrait,
{
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = user_role::Entity::find()
        .filter(user_role::Column::UserId.is_in(ids.iter().copied()))
        .all(conn)
        .await?;
    let mut map: HashMap<Uuid, RoleSet> = HashMap::new();
    for row in rows {
        let entry = map.entry(row.user_id).or_default();
        *entry = entry.with(row.role);
    }
    Ok(map)
}

/// Users holding `role` but none of `exclude`, ordered by username.
pub async fn list_by_role<C>(
    conn: &C,
    role: Role,
    exclude: &[Role],
) -> Result<Vec<user::Model>, DbErr>
where
    C: ConnectionTrait,
{
    let mut query = user::Entity::find().filter(
        user::Column::Id.in_subquery(
            Query::select()
                .column(user_role::Column::UserId)
                .from(user_role::Entity)
                .and_where(user_role::Column::Role.eq(role))
                .to_owned(),
        ),
    );
    if !exclude.is_empty() {
        query = query.filter(
            user::Column::Id.not_in_subquery(
                Query::select()
                    .column(user_role::Column::UserId)
                    .from(user_role::Entity)
                    .and_where(user_role::Column::Role.is_in(exclude.iter().copied()))
                    .to_owned(),
            ),
        );
    }
    query.order_by_asc(user::Column::Username).all(conn).await
}

/// Idempotent: granting a held role is a no-op.
pub async fn grant<C>(conn: &C, user_id: Uuid, role: Role) -> Result<(), DbErr>
where
    C: ConnectionTrait,
{
    user_role::Entity::insert(user_role::ActiveModel {
        user_id: Set(user_id),
        role: Set(role),
    })
    .on_conflict(
        OnConflict::columns([user_role::Column::UserId, user_role::Column::Role])
            .do_nothing()
            .to_owned(),
    )
    .exec_without_returning(conn)
    .await?;
    Ok(())
}

/// Idempotent: revoking an absent role is a no-op.
pub async fn revoke<C>(conn: &C, user_id: Uuid, role: Role) -> Result<(), DbErr>
where
    C: ConnectionTrait,
{
    user_role::Entity::delete_many()
        .filter(user_role::Column::UserId.eq(user_id))
        .filter(user_role::Column::Role.eq(role))
        .exec(conn)
        .await?;
    Ok(())
}
