//! Permission Engine.
//!
//! Authorization is a single decision table consulted by every service. Each
//! rule names a resource kind, the verbs it covers and a condition. Rules are
//! evaluated top to bottom; the first condition that yields a decision wins and
//! anything unmatched is denied.

use std::fmt;

use tracing::debug;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::directory::{Role, RoleSet};
use crate::error::{ServiceError, ServiceResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Verb {
    Read,
    List,
    Create,
    Update,
    Delete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    fn from_bool(allowed: bool) -> Self {
        if allowed {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }
}

/// Deployment switches that widen anonymous access.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PolicyConfig {
    pub public_catalog: bool,
    pub allow_signup: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            public_catalog: true,
            allow_signup: true,
        }
    }
}

/// The acting identity for one request. `identity` is `None` when anonymous.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Principal {
    pub identity: Option<Uuid>,
    pub roles: RoleSet,
}

impl Principal {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(identity: Uuid, roles: RoleSet) -> Self {
        Self {
            identity: Some(identity),
            roles,
        }
    }

    fn is(&self, other: Uuid) -> bool {
        self.identity == Some(other)
    }
}

impl From<&CurrentUser> for Principal {
    fn from(user: &CurrentUser) -> Self {
        Principal::user(user.user_id, user.roles)
    }
}

/// Which order fields an update touches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OrderFields {
    pub status: bool,
    pub delivery_crew: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resource {
    Category,
    MenuItem,
    Rating,
    Profile {
        owner: Uuid,
        owner_roles: RoleSet,
    },
    Users,
    Signup,
    RoleGroup {
        group: Role,
    },
    Cart {
        owner: Uuid,
    },
    Orders,
    Order {
        owner: Uuid,
        delivery_crew: Option<Uuid>,
        fields: OrderFields,
    },
    Purchases,
    Purchase {
        owner: Uuid,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    Category,
    MenuItem,
    Rating,
    Profile,
    Users,
    Signup,
    RoleGroup,
    Cart,
    Orders,
    Order,
    Purchases,
    Purchase,
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Category => ResourceKind::Category,
            Resource::MenuItem => ResourceKind::MenuItem,
            Resource::Rating => ResourceKind::Rating,
            Resource::Profile { .. } => ResourceKind::Profile,
            Resource::Users => ResourceKind::Users,
            Resource::Signup => ResourceKind::Signup,
            Resource::RoleGroup { .. } => ResourceKind::RoleGroup,
            Resource::Cart { .. } => ResourceKind::Cart,
            Resource::Orders => ResourceKind::Orders,
            Resource::Order { .. } => ResourceKind::Order,
            Resource::Purchases => ResourceKind::Purchases,
            Resource::Purchase { .. } => ResourceKind::Purchase,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Category => "category",
            ResourceKind::MenuItem => "menu_item",
            ResourceKind::Rating => "rating",
            ResourceKind::Profile => "profile",
            ResourceKind::Users => "users",
            ResourceKind::Signup => "signup",
            ResourceKind::RoleGroup => "role_group",
            ResourceKind::Cart => "cart",
            ResourceKind::Orders => "orders",
            ResourceKind::Order => "order",
            ResourceKind::Purchases => "purchases",
            ResourceKind::Purchase => "purchase",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug)]
enum Condition {
    /// Authenticated callers always; anonymous ones when the catalog is public.
    CatalogReader,
    /// Matches only when the caller is the profile owner; otherwise falls through.
    SelfProfile,
    Staff,
    /// Staff, but a Manager may not act on a SysAdmin.
    StaffOutranking,
    Authenticated,
    Customer,
    SignupOpen,
    /// SysAdmin for the SysAdmin and Manager groups, any staff for the rest.
    RoleGroupAdmin,
    OwningCustomer,
    OrderViewer,
    OrderEditor,
    Owner,
}

struct Rule {
    kind: ResourceKind,
    verbs: &'static [Verb],
    condition: Condition,
}

const READ: &[Verb] = &[Verb::Read, Verb::List];
const WRITE: &[Verb] = &[Verb::Create, Verb::Update, Verb::Delete];
const ANY: &[Verb] = &[Verb::Read, Verb::List, Verb::Create, Verb::Update, Verb::Delete];
const MODIFY: &[Verb] = &[Verb::Update, Verb::Delete];

#[rustfmt::skip]
const RULES: &[Rule] = &[
    Rule { kind: ResourceKind::Category, verbs: READ, condition: Condition::CatalogReader },
    Rule { kind: ResourceKind::Category, verbs: WRITE, condition: Condition::Staff },
    Rule { kind: ResourceKind::MenuItem, verbs: READ, condition: Condition::CatalogReader },
    Rule { kind: ResourceKind::MenuItem, verbs: WRITE, condition: Condition::Staff },
    Rule { kind: ResourceKind::Rating, verbs: READ, condition: Condition::CatalogReader },
    Rule { kind: ResourceKind::Rating, verbs: &[Verb::Create, Verb::Update], condition: Condition::Customer },
    Rule { kind: ResourceKind::Profile, verbs: ANY, condition: Condition::SelfProfile },
    Rule { kind: ResourceKind::Profile, verbs: &[Verb::Read], condition: Condition::Staff },
    Rule { kind: ResourceKind::Profile, verbs: MODIFY, condition: Condition::StaffOutranking },
    Rule { kind: ResourceKind::Users, verbs: &[Verb::Read, Verb::List, Verb::Create], condition: Condition::Staff },
    Rule { kind: ResourceKind::Signup, verbs: &[Verb::Create], condition: Condition::SignupOpen },
    Rule { kind: ResourceKind::RoleGroup, verbs: READ, condition: Condition::Staff },
    Rule { kind: ResourceKind::RoleGroup, verbs: &[Verb::Create, Verb::Delete], condition: Condition::RoleGroupAdmin },
    Rule { kind: ResourceKind::Cart, verbs: ANY, condition: Condition::OwningCustomer },
    Rule { kind: ResourceKind::Orders, verbs: READ, condition: Condition::Authenticated },
    Rule { kind: ResourceKind::Orders, verbs: &[Verb::Create], condition: Condition::Customer },
    Rule { kind: ResourceKind::Order, verbs: &[Verb::Read], condition: Condition::OrderViewer },
    Rule { kind: ResourceKind::Order, verbs: &[Verb::Update], condition: Condition::OrderEditor },
    Rule { kind: ResourceKind::Order, verbs: &[Verb::Delete], condition: Condition::Staff },
    Rule { kind: ResourceKind::Purchases, verbs: READ, condition: Condition::Authenticated },
    Rule { kind: ResourceKind::Purchase, verbs: &[Verb::Read], condition: Condition::Owner },
];

impl Condition {
    fn evaluate(
        self,
        principal: &Principal,
        resource: &Resource,
        policy: &PolicyConfig,
    ) -> Option<Decision> {
        let roles = principal.roles;
        let authenticated = principal.identity.is_some();
        let decision = match (self, resource) {
            (Condition::CatalogReader, _) => {
                Decision::from_bool(authenticated || policy.public_catalog)
            }
            (Condition::SelfProfile, Resource::Profile { owner, .. }) => {
                if principal.is(*owner) {
                    Decision::Allow
                } else {
                    return None;
                }
            }
            (Condition::Staff, _) => Decision::from_bool(authenticated && roles.is_staff()),
            (Condition::StaffOutranking, Resource::Profile { owner_roles, .. }) => {
                let outranked =
                    owner_roles.contains(Role::SysAdmin) && !roles.contains(Role::SysAdmin);
                Decision::from_bool(authenticated && roles.is_staff() && !outranked)
            }
            (Condition::Authenticated, _) => Decision::from_bool(authenticated),
            (Condition::Customer, _) => {
                Decision::from_bool(authenticated && roles.contains(Role::Customer))
            }
            (Condition::SignupOpen, _) => Decision::from_bool(policy.allow_signup),
            (Condition::RoleGroupAdmin, Resource::RoleGroup { group }) => {
                let allowed = match group {
                    Role::SysAdmin | Role::Manager => roles.contains(Role::SysAdmin),
                    Role::DeliveryCrew | Role::Customer => roles.is_staff(),
                };
                Decision::from_bool(authenticated && allowed)
            }
            (Condition::OwningCustomer, Resource::Cart { owner }) => {
                Decision::from_bool(principal.is(*owner) && roles.contains(Role::Customer))
            }
            (
                Condition::OrderViewer,
                Resource::Order {
                    owner,
                    delivery_crew,
                    ..
                },
            ) => Decision::from_bool(
                authenticated
                    && (roles.is_staff()
                        || principal.is(*owner)
                        || assigned_crew(principal, *delivery_crew)),
            ),
            (
                Condition::OrderEditor,
                Resource::Order {
                    delivery_crew,
                    fields,
                    ..
                },
            ) => {
                let staff = authenticated && roles.is_staff();
                let crew_may_touch = !fields.delivery_crew
                    && assigned_crew(principal, *delivery_crew);
                Decision::from_bool(staff || crew_may_touch)
            }
            (Condition::Owner, Resource::Purchase { owner }) => {
                Decision::from_bool(principal.is(*owner))
            }
            _ => Decision::Deny,
        };
        Some(decision)
    }
}

fn assigned_crew(principal: &Principal, delivery_crew: Option<Uuid>) -> bool {
    principal.roles.contains(Role::DeliveryCrew)
        && matches!((principal.identity, delivery_crew), (Some(me), Some(crew)) if me == crew)
}

/// Pure decision function. Same inputs always give the same answer.
pub fn decide(
    principal: &Principal,
    verb: Verb,
    resource: &Resource,
    policy: &PolicyConfig,
) -> Decision {
    let kind = resource.kind();
    RULES
        .iter()
        .filter(|rule| rule.kind == kind && rule.verbs.contains(&verb))
        .find_map(|rule| rule.condition.evaluate(principal, resource, policy))
        .unwrap_or(Decision::Deny)
}

/// Which orders a caller may list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderScope {
    All,
    Assigned(Uuid),
    Owned(Uuid),
    Nothing,
}

pub fn order_scope(principal: &Principal) -> OrderScope {
    match principal.identity {
        None => OrderScope::Nothing,
        Some(_) if principal.roles.is_staff() => OrderScope::All,
        Some(id) if principal.roles.contains(Role::DeliveryCrew) => OrderScope::Assigned(id),
        Some(id) => OrderScope::Owned(id),
    }
}

/// Per-request gate that turns a `Deny` into an error before any work is done.
#[derive(Clone, Copy, Debug)]
pub struct Access {
    pub principal: Principal,
    pub policy: PolicyConfig,
}

impl Access {
    pub fn new(principal: Principal, policy: PolicyConfig) -> Self {
        Self { principal, policy }
    }

    pub fn require(&self, verb: Verb, resource: &Resource) -> ServiceResult<()> {
        match decide(&self.principal, verb, resource, &self.policy) {
            Decision::Allow => Ok(()),
            Decision::Deny => {
                debug!(
                    verb = ?verb,
                    resource = %resource.kind(),
                    identity = ?self.principal.identity,
                    "permission denied"
                );
                if self.principal.identity.is_none() {
                    Err(ServiceError::Unauthenticated)
                } else {
                    Err(ServiceError::Forbidden)
                }
            }
        }
    }

    pub fn identity(&self) -> ServiceResult<Uuid> {
        self.principal.identity.ok_or(ServiceError::Unauthenticated)
    }

    pub fn roles(&self) -> RoleSet {
        self.principal.roles
    }

    pub fn order_scope(&self) -> OrderScope {
        order_scope(&self.principal)
    }
}
