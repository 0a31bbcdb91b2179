use std::sync::Arc;

use async_graphql::{
    Context, EmptySubscription, Enum, Error, ErrorExtensions, InputObject, MaybeUndefined, Object,
    Schema, SimpleObject, ID,
};
use chrono::{DateTime, Utc};
use entity::{cart_line, category, customer_order, purchase_item, rating};
use rust_decimal::Decimal;
use sea_orm::DatabaseConnection;
use uuid::Uuid;

use crate::accounts::{self, NewUser, ProfilePatch, UserView};
use crate::auth::CurrentUser;
use crate::cart::{self, CartView};
use crate::catalog::{
    self, CategoryDraft, CategoryPatch, MenuFilter, MenuItemDraft, MenuItemPatch, MenuItemView,
};
use crate::checkout;
use crate::directory::Role;
use crate::error::ServiceError;
use crate::money;
use crate::orders::{self, OrderPatch, OrderView};
use crate::permission::{Access, PolicyConfig, Principal};
use crate::purchases::{self, PurchaseView};

pub type RestaurantSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

pub struct AppSchema(pub RestaurantSchema);

pub fn build_schema(db: Arc<DatabaseConnection>, policy: PolicyConfig) -> AppSchema {
    let schema = Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(db)
        .data(policy)
        .finish();
    AppSchema(schema)
}

pub struct QueryRoot;
pub struct MutationRoot;

#[Object]
impl QueryRoot {
    async fn restaurant(&self) -> RestaurantQuery {
        RestaurantQuery
    }
}

#[Object]
impl MutationRoot {
    async fn restaurant(&self) -> RestaurantMutation {
        RestaurantMutation
    }
}

#[derive(Default)]
pub struct RestaurantQuery;

#[derive(Default)]
pub struct RestaurantMutation;

#[Object]
impl RestaurantQuery {
    async fn me(&self, ctx: &Context<'_>) -> async_graphql::Result<UserNode> {
        let db = database(ctx)?;
        let view = accounts::me(db.as_ref(), &access(ctx))
            .await
            .map_err(service_error)?;
        Ok(UserNode::from(view))
    }

    async fn users(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<UserNode>> {
        let db = database(ctx)?;
        let views = accounts::list_users(db.as_ref(), &access(ctx))
            .await
            .map_err(service_error)?;
        Ok(views.into_iter().map(UserNode::from).collect())
    }

    async fn user(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<UserNode> {
        let db = database(ctx)?;
        let id = parse_uuid("id", &id)?;
        let view = accounts::get_user(db.as_ref(), &access(ctx), id)
            .await
            .map_err(service_error)?;
        Ok(UserNode::from(view))
    }

    /// Members of a role group, leaving out holders of any higher role.
    #[graphql(name = "roleMembers")]
    async fn role_members(
        &self,
        ctx: &Context<'_>,
        role: RoleName,
    ) -> async_graphql::Result<Vec<UserNode>> {
        let db = database(ctx)?;
        let views = accounts::list_role_members(db.as_ref(), &access(ctx), role.into())
            .await
            .map_err(service_error)?;
        Ok(views.into_iter().map(UserNode::from).collect())
    }

    async fn categories(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<CategoryNode>> {
        let db = database(ctx)?;
        let records = catalog::list_categories(db.as_ref(), &access(ctx))
            .await
            .map_err(service_error)?;
        Ok(records.into_iter().map(CategoryNode::from).collect())
    }

    async fn category(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<CategoryNode> {
        let db = database(ctx)?;
        let id = parse_uuid("id", &id)?;
        let record = catalog::get_category(db.as_ref(), &access(ctx), id)
            .await
            .map_err(service_error)?;
        Ok(CategoryNode::from(record))
    }

    #[graphql(name = "menuItems")]
    async fn menu_items(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "categoryId")] category_id: Option<ID>,
        featured: Option<bool>,
    ) -> async_graphql::Result<Vec<MenuItemNode>> {
        let db = database(ctx)?;
        let filter = MenuFilter {
            category_id: parse_optional_uuid("categoryId", category_id.as_ref())?,
            featured,
        };
        let views = catalog::list_menu_items(db.as_ref(), &access(ctx), filter)
            .await
            .map_err(service_error)?;
        Ok(views.into_iter().map(MenuItemNode::from).collect())
    }

    #[graphql(name = "menuItem")]
    async fn menu_item(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<MenuItemNode> {
        let db = database(ctx)?;
        let id = parse_uuid("id", &id)?;
        let view = catalog::get_menu_item(db.as_ref(), &access(ctx), id)
            .await
            .map_err(service_error)?;
        Ok(MenuItemNode::from(view))
    }

    async fn cart(&self, ctx: &Context<'_>) -> async_graphql::Result<CartNode> {
        let db = database(ctx)?;
        let view = cart::view(db.as_ref(), &access(ctx))
            .await
            .map_err(service_error)?;
        Ok(CartNode::from(view))
    }

    async fn orders(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<OrderNode>> {
        let db = database(ctx)?;
        let views = orders::list(db.as_ref(), &access(ctx))
            .await
            .map_err(service_error)?;
        Ok(views.into_iter().map(OrderNode::from).collect())
    }

    async fn order(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<OrderNode> {
        let db = database(ctx)?;
        let id = parse_uuid("id", &id)?;
        let view = orders::get(db.as_ref(), &access(ctx), id)
            .await
            .map_err(service_error)?;
        Ok(OrderNode::from(view))
    }

    async fn purchases(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<PurchaseNode>> {
        let db = database(ctx)?;
        let views = purchases::list(db.as_ref(), &access(ctx))
            .await
            .map_err(service_error)?;
        Ok(views.into_iter().map(PurchaseNode::from).collect())
    }

    async fn purchase(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<PurchaseNode> {
        let db = database(ctx)?;
        let id = parse_uuid("id", &id)?;
        let view = purchases::get(db.as_ref(), &access(ctx), id)
            .await
            .map_err(service_error)?;
        Ok(PurchaseNode::from(view))
    }
}

#[Object]
impl RestaurantMutation {
    #[graphql(name = "signUp")]
    async fn sign_up(
        &self,
        ctx: &Context<'_>,
        input: SignUpInput,
    ) -> async_graphql::Result<UserNode> {
        let db = database(ctx)?;
        let request = NewUser {
            username: input.username,
            email: input.email,
            display_name: input.display_name,
            roles: Vec::new(),
        };
        let view = accounts::sign_up(db.as_ref(), &access(ctx), request)
            .await
            .map_err(service_error)?;
        Ok(UserNode::from(view))
    }

    #[graphql(name = "createUser")]
    async fn create_user(
        &self,
        ctx: &Context<'_>,
        input: NewUserInput,
    ) -> async_graphql::Result<UserNode> {
        let db = database(ctx)?;
        let request = NewUser {
            username: input.username,
            email: input.email,
            display_name: input.display_name,
            roles: input.roles.into_iter().map(Role::from).collect(),
        };
        let view = accounts::create_user(db.as_ref(), &access(ctx), request)
            .await
            .map_err(service_error)?;
        Ok(UserNode::from(view))
    }

    #[graphql(name = "updateUser")]
    async fn update_user(
        &self,
        ctx: &Context<'_>,
        id: ID,
        input: UpdateUserInput,
    ) -> async_graphql::Result<UserNode> {
        let db = database(ctx)?;
        let id = parse_uuid("id", &id)?;
        let patch = ProfilePatch {
            email: input.email,
            display_name: input.display_name,
            is_active: input.is_active,
        };
        let view = accounts::update_user(db.as_ref(), &access(ctx), id, patch)
            .await
            .map_err(service_error)?;
        Ok(UserNode::from(view))
    }

    #[graphql(name = "deleteUser")]
    async fn delete_user(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<bool> {
        let db = database(ctx)?;
        let id = parse_uuid("id", &id)?;
        accounts::delete_user(db.as_ref(), &access(ctx), id)
            .await
            .map_err(service_error)?;
        Ok(true)
    }

    #[graphql(name = "grantRole")]
    async fn grant_role(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "userId")] user_id: ID,
        role: RoleName,
    ) -> async_graphql::Result<UserNode> {
        let db = database(ctx)?;
        let user_id = parse_uuid("userId", &user_id)?;
        let view = accounts::grant_role(db.as_ref(), &access(ctx), user_id, role.into())
            .await
            .map_err(service_error)?;
        Ok(UserNode::from(view))
    }

    #[graphql(name = "revokeRole")]
    async fn revoke_role(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "userId")] user_id: ID,
        role: RoleName,
    ) -> async_graphql::Result<UserNode> {
        let db = database(ctx)?;
        let user_id = parse_uuid("userId", &user_id)?;
        let view = accounts::revoke_role(db.as_ref(), &access(ctx), user_id, role.into())
            .await
            .map_err(service_error)?;
        Ok(UserNode::from(view))
    }

    #[graphql(name = "createCategory")]
    async fn create_category(
        &self,
        ctx: &Context<'_>,
        input: CategoryInput,
    ) -> async_graphql::Result<CategoryNode> {
        let db = database(ctx)?;
        let draft = CategoryDraft {
            title: input.title,
            slug: input.slug,
        };
        let record = catalog::create_category(db.as_ref(), &access(ctx), draft)
            .await
            .map_err(service_error)?;
        Ok(CategoryNode::from(record))
    }

    #[graphql(name = "updateCategory")]
    async fn update_category(
        &self,
        ctx: &Context<'_>,
        id: ID,
        input: UpdateCategoryInput,
    ) -> async_graphql::Result<CategoryNode> {
        let db = database(ctx)?;
        let id = parse_uuid("id", &id)?;
        let patch = CategoryPatch {
            title: input.title,
            slug: input.slug,
        };
        let record = catalog::update_category(db.as_ref(), &access(ctx), id, patch)
            .await
            .map_err(service_error)?;
        Ok(CategoryNode::from(record))
    }

    #[graphql(name = "deleteCategory")]
    async fn delete_category(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<bool> {
        let db = database(ctx)?;
        let id = parse_uuid("id", &id)?;
        catalog::delete_category(db.as_ref(), &access(ctx), id)
            .await
            .map_err(service_error)?;
        Ok(true)
    }

    #[graphql(name = "createMenuItem")]
    async fn create_menu_item(
        &self,
        ctx: &Context<'_>,
        input: MenuItemInput,
    ) -> async_graphql::Result<MenuItemNode> {
        let db = database(ctx)?;
        let draft = MenuItemDraft {
            title: input.title,
            price: input.price,
            featured: input.featured.unwrap_or(false),
            category_id: parse_uuid("categoryId", &input.category_id)?,
        };
        let record = catalog::create_menu_item(db.as_ref(), &access(ctx), draft)
            .await
            .map_err(service_error)?;
        Ok(MenuItemNode::from(MenuItemView {
            item: record,
            average_rating: None,
        }))
    }

    #[graphql(name = "updateMenuItem")]
    async fn update_menu_item(
        &self,
        ctx: &Context<'_>,
        id: ID,
        input: UpdateMenuItemInput,
    ) -> async_graphql::Result<MenuItemNode> {
        let db = database(ctx)?;
        let id = parse_uuid("id", &id)?;
        let patch = MenuItemPatch {
            title: input.title,
            price: input.price,
            featured: input.featured,
            category_id: parse_optional_uuid("categoryId", input.category_id.as_ref())?,
        };
        let record = catalog::update_menu_item(db.as_ref(), &access(ctx), id, patch)
            .await
            .map_err(service_error)?;
        let averages = catalog::average_ratings(db.as_ref(), &[record.id])
            .await
            .map_err(service_error)?;
        Ok(MenuItemNode::from(MenuItemView {
            average_rating: averages.get(&record.id).copied(),
            item: record,
        }))
    }

    #[graphql(name = "deleteMenuItem")]
    async fn delete_menu_item(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<bool> {
        let db = database(ctx)?;
        let id = parse_uuid("id", &id)?;
        catalog::delete_menu_item(db.as_ref(), &access(ctx), id)
            .await
            .map_err(service_error)?;
        Ok(true)
    }

    #[graphql(name = "rateMenuItem")]
    async fn rate_menu_item(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "menuItemId")] menu_item_id: ID,
        score: i32,
    ) -> async_graphql::Result<RatingNode> {
        let db = database(ctx)?;
        let menu_item_id = parse_uuid("menuItemId", &menu_item_id)?;
        let record = catalog::rate_menu_item(db.as_ref(), &access(ctx), menu_item_id, score)
            .await
            .map_err(service_error)?;
        Ok(RatingNode::from(record))
    }

    #[graphql(name = "addToCart")]
    async fn add_to_cart(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "menuItemId")] menu_item_id: ID,
        quantity: Option<i32>,
    ) -> async_graphql::Result<CartLineNode> {
        let db = database(ctx)?;
        let menu_item_id = parse_uuid("menuItemId", &menu_item_id)?;
        let line = cart::add_line(db.as_ref(), &access(ctx), menu_item_id, quantity)
            .await
            .map_err(service_error)?;
        Ok(CartLineNode::from(line))
    }

    #[graphql(name = "setCartLineQuantity")]
    async fn set_cart_line_quantity(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "lineId")] line_id: ID,
        quantity: i32,
    ) -> async_graphql::Result<CartLineNode> {
        let db = database(ctx)?;
        let line_id = parse_uuid("lineId", &line_id)?;
        let line = cart::set_line_quantity(db.as_ref(), &access(ctx), line_id, quantity)
            .await
            .map_err(service_error)?;
        Ok(CartLineNode::from(line))
    }

    #[graphql(name = "removeCartLine")]
    async fn remove_cart_line(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "lineId")] line_id: ID,
    ) -> async_graphql::Result<bool> {
        let db = database(ctx)?;
        let line_id = parse_uuid("lineId", &line_id)?;
        cart::remove_line(db.as_ref(), &access(ctx), line_id)
            .await
            .map_err(service_error)?;
        Ok(true)
    }

    /// Returns how many lines were removed.
    #[graphql(name = "clearCart")]
    async fn clear_cart(&self, ctx: &Context<'_>) -> async_graphql::Result<i32> {
        let db = database(ctx)?;
        let removed = cart::clear(db.as_ref(), &access(ctx))
            .await
            .map_err(service_error)?;
        Ok(i32::try_from(removed).unwrap_or(i32::MAX))
    }

    async fn checkout(&self, ctx: &Context<'_>) -> async_graphql::Result<OrderNode> {
        let db = database(ctx)?;
        let receipt = checkout::checkout(db.as_ref(), &access(ctx))
            .await
            .map_err(service_error)?;
        Ok(OrderNode::from(OrderView {
            order: receipt.order,
            items: receipt.items,
        }))
    }

    #[graphql(name = "updateOrder")]
    async fn update_order(
        &self,
        ctx: &Context<'_>,
        id: ID,
        input: UpdateOrderInput,
    ) -> async_graphql::Result<OrderNode> {
        let db = database(ctx)?;
        let id = parse_uuid("id", &id)?;
        let delivery_crew = match input.delivery_crew_id {
            MaybeUndefined::Undefined => None,
            MaybeUndefined::Null => Some(None),
            MaybeUndefined::Value(crew) => Some(Some(parse_uuid("deliveryCrewId", &crew)?)),
        };
        let patch = OrderPatch {
            status: input.status,
            delivery_crew,
        };
        let view = orders::update(db.as_ref(), &access(ctx), id, patch)
            .await
            .map_err(service_error)?;
        Ok(OrderNode::from(view))
    }

    /// `status` is 0 (pending) or 1 (delivered).
    #[graphql(name = "updateOrderStatus")]
    async fn update_order_status(
        &self,
        ctx: &Context<'_>,
        id: ID,
        status: i32,
    ) -> async_graphql::Result<OrderNode> {
        let db = database(ctx)?;
        let id = parse_uuid("id", &id)?;
        let view = orders::update_status(db.as_ref(), &access(ctx), id, status)
            .await
            .map_err(service_error)?;
        Ok(OrderNode::from(view))
    }

    /// Pass a null `crewId` to unassign.
    #[graphql(name = "assignDeliveryCrew")]
    async fn assign_delivery_crew(
        &self,
        ctx: &Context<'_>,
        id: ID,
        #[graphql(name = "crewId")] crew_id: Option<ID>,
    ) -> async_graphql::Result<OrderNode> {
        let db = database(ctx)?;
        let id = parse_uuid("id", &id)?;
        let crew = parse_optional_uuid("crewId", crew_id.as_ref())?;
        let view = orders::assign_delivery_crew(db.as_ref(), &access(ctx), id, crew)
            .await
            .map_err(service_error)?;
        Ok(OrderNode::from(view))
    }

    #[graphql(name = "deleteOrder")]
    async fn delete_order(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<bool> {
        let db = database(ctx)?;
        let id = parse_uuid("id", &id)?;
        orders::delete(db.as_ref(), &access(ctx), id)
            .await
            .map_err(service_error)?;
        Ok(true)
    }
}

#[derive(Enum, Copy, Clone, Debug, Eq, PartialEq)]
pub enum RoleName {
    #[graphql(name = "SYSADMIN")]
    SysAdmin,
    #[graphql(name = "MANAGER")]
    Manager,
    #[graphql(name = "DELIVERY_CREW")]
    DeliveryCrew,
    #[graphql(name = "CUSTOMER")]
    Customer,
}

impl From<Role> for RoleName {
    fn from(value: Role) -> Self {
        match value {
            Role::SysAdmin => RoleName::SysAdmin,
            Role::Manager => RoleName::Manager,
            Role::DeliveryCrew => RoleName::DeliveryCrew,
            Role::Customer => RoleName::Customer,
        }
    }
}

impl From<RoleName> for Role {
    fn from(value: RoleName) -> Self {
        match value {
            RoleName::SysAdmin => Role::SysAdmin,
            RoleName::Manager => Role::Manager,
            RoleName::DeliveryCrew => Role::DeliveryCrew,
            RoleName::Customer => Role::Customer,
        }
    }
}

#[derive(Enum, Copy, Clone, Debug, Eq, PartialEq)]
pub enum OrderStatus {
    #[graphql(name = "PENDING")]
    Pending,
    #[graphql(name = "DELIVERED")]
    Delivered,
}

impl From<customer_order::Status> for OrderStatus {
    fn from(value: customer_order::Status) -> Self {
        match value {
            customer_order::Status::Pending => OrderStatus::Pending,
            customer_order::Status::Delivered => OrderStatus::Delivered,
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "User")]
pub struct UserNode {
    pub id: ID,
    pub username: String,
    pub email: String,
    #[graphql(name = "displayName")]
    pub display_name: String,
    #[graphql(name = "isActive")]
    pub is_active: bool,
    pub roles: Vec<RoleName>,
    #[graphql(name = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[graphql(name = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl From<UserView> for UserNode {
    fn from(view: UserView) -> Self {
        let UserView { user, roles } = view;
        Self {
            id: to_id(user.id),
            username: user.username,
            email: user.email,
            display_name: user.display_name,
            is_active: user.is_active,
            roles: roles.iter().map(RoleName::from).collect(),
            created_at: user.created_at.into(),
            updated_at: user.updated_at.into(),
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "Category")]
pub struct CategoryNode {
    pub id: ID,
    pub title: String,
    pub slug: String,
}

impl From<category::Model> for CategoryNode {
    fn from(model: category::Model) -> Self {
        Self {
            id: to_id(model.id),
            title: model.title,
            slug: model.slug,
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "MenuItem")]
pub struct MenuItemNode {
    pub id: ID,
    pub title: String,
    pub price: Decimal,
    /// Price including 10% tax.
    #[graphql(name = "afterTax")]
    pub after_tax: Decimal,
    pub featured: bool,
    #[graphql(name = "categoryId")]
    pub category_id: ID,
    #[graphql(name = "averageRating")]
    pub average_rating: Option<f64>,
}

impl From<MenuItemView> for MenuItemNode {
    fn from(view: MenuItemView) -> Self {
        let MenuItemView {
            item,
            average_rating,
        } = view;
        Self {
            id: to_id(item.id),
            title: item.title,
            price: money::to_decimal(item.price_cents),
            after_tax: money::after_tax(item.price_cents),
            featured: item.featured,
            category_id: to_id(item.category_id),
            average_rating,
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "Rating")]
pub struct RatingNode {
    pub id: ID,
    #[graphql(name = "menuItemId")]
    pub menu_item_id: ID,
    pub score: i32,
    #[graphql(name = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl From<rating::Model> for RatingNode {
    fn from(model: rating::Model) -> Self {
        Self {
            id: to_id(model.id),
            menu_item_id: to_id(model.menu_item_id),
            score: model.score,
            updated_at: model.updated_at.into(),
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "CartLine")]
pub struct CartLineNode {
    pub id: ID,
    #[graphql(name = "menuItemId")]
    pub menu_item_id: ID,
    pub quantity: i32,
    #[graphql(name = "unitPrice")]
    pub unit_price: Decimal,
    pub price: Decimal,
}

impl From<cart_line::Model> for CartLineNode {
    fn from(model: cart_line::Model) -> Self {
        Self {
            id: to_id(model.id),
            menu_item_id: to_id(model.menu_item_id),
            quantity: model.quantity,
            unit_price: money::to_decimal(model.unit_price_cents),
            price: money::to_decimal(model.line_price_cents),
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "Cart")]
pub struct CartNode {
    pub lines: Vec<CartLineNode>,
    pub total: Decimal,
}

impl From<CartView> for CartNode {
    fn from(view: CartView) -> Self {
        Self {
            total: money::to_decimal(view.total_cents),
            lines: view.lines.into_iter().map(CartLineNode::from).collect(),
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "PurchaseItem")]
pub struct PurchaseItemNode {
    pub id: ID,
    /// Cleared when the menu item is later removed from the catalog.
    #[graphql(name = "menuItemId")]
    pub menu_item_id: Option<ID>,
    pub title: String,
    pub quantity: i32,
    #[graphql(name = "unitPrice")]
    pub unit_price: Decimal,
    pub price: Decimal,
}

impl From<purchase_item::Model> for PurchaseItemNode {
    fn from(model: purchase_item::Model) -> Self {
        Self {
            id: to_id(model.id),
            menu_item_id: model.menu_item_id.map(to_id),
            title: model.title,
            quantity: model.quantity,
            unit_price: money::to_decimal(model.unit_price_cents),
            price: money::to_decimal(model.line_price_cents),
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "Purchase")]
pub struct PurchaseNode {
    pub id: ID,
    pub items: Vec<PurchaseItemNode>,
    pub total: Decimal,
    #[graphql(name = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl From<PurchaseView> for PurchaseNode {
    fn from(view: PurchaseView) -> Self {
        let total: i64 = view.items.iter().map(|item| item.line_price_cents).sum();
        Self {
            id: to_id(view.purchase.id),
            items: view.items.into_iter().map(PurchaseItemNode::from).collect(),
            total: money::to_decimal(total),
            created_at: view.purchase.created_at.into(),
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "Order")]
pub struct OrderNode {
    pub id: ID,
    #[graphql(name = "customerId")]
    pub customer_id: ID,
    #[graphql(name = "purchaseId")]
    pub purchase_id: ID,
    #[graphql(name = "deliveryCrewId")]
    pub delivery_crew_id: Option<ID>,
    pub status: OrderStatus,
    /// 0 = pending, 1 = delivered.
    #[graphql(name = "statusCode")]
    pub status_code: i32,
    pub total: Decimal,
    pub items: Vec<PurchaseItemNode>,
    #[graphql(name = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[graphql(name = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl From<OrderView> for OrderNode {
    fn from(view: OrderView) -> Self {
        let OrderView { order, items } = view;
        Self {
            id: to_id(order.id),
            customer_id: to_id(order.user_id),
            purchase_id: to_id(order.purchase_id),
            delivery_crew_id: order.delivery_crew_id.map(to_id),
            status: order.status.into(),
            status_code: order.status.code(),
            total: money::to_decimal(order.total_cents),
            items: items.into_iter().map(PurchaseItemNode::from).collect(),
            created_at: order.created_at.into(),
            updated_at: order.updated_at.into(),
        }
    }
}

#[derive(Clone, Debug, InputObject)]
pub struct SignUpInput {
    pub username: String,
    pub email: String,
    #[graphql(name = "displayName")]
    pub display_name: Option<String>,
}

#[derive(Clone, Debug, InputObject)]
pub struct NewUserInput {
    pub username: String,
    pub email: String,
    #[graphql(name = "displayName")]
    pub display_name: Option<String>,
    #[graphql(default)]
    pub roles: Vec<RoleName>,
}

#[derive(Clone, Debug, InputObject)]
pub struct UpdateUserInput {
    pub email: Option<String>,
    #[graphql(name = "displayName")]
    pub display_name: Option<String>,
    #[graphql(name = "isActive")]
    pub is_active: Option<bool>,
}

#[derive(Clone, Debug, InputObject)]
pub struct CategoryInput {
    pub title: String,
    pub slug: String,
}

#[derive(Clone, Debug, InputObject)]
pub struct UpdateCategoryInput {
    pub title: Option<String>,
    pub slug: Option<String>,
}

#[derive(Clone, Debug, InputObject)]
pub struct MenuItemInput {
    pub title: String,
    pub price: Decimal,
    pub featured: Option<bool>,
    #[graphql(name = "categoryId")]
    pub category_id: ID,
}

#[derive(Clone, Debug, InputObject)]
pub struct UpdateMenuItemInput {
    pub title: Option<String>,
    pub price: Option<Decimal>,
    pub featured: Option<bool>,
    #[graphql(name = "categoryId")]
    pub category_id: Option<ID>,
}

#[derive(Clone, Debug, InputObject)]
pub struct UpdateOrderInput {
    /// 0 = pending, 1 = delivered.
    pub status: Option<i32>,
    /// Omit to leave unchanged, null to unassign.
    #[graphql(name = "deliveryCrewId")]
    pub delivery_crew_id: MaybeUndefined<ID>,
}

fn database(ctx: &Context<'_>) -> async_graphql::Result<Arc<DatabaseConnection>> {
    ctx.data::<Arc<DatabaseConnection>>()
        .cloned()
        .map_err(|_| error_with_code("INTERNAL", "Missing database connection"))
}

/// Builds the permission gate for this request from the attached identity.
fn access(ctx: &Context<'_>) -> Access {
    let policy = ctx.data_opt::<PolicyConfig>().copied().unwrap_or_default();
    let principal = ctx
        .data_opt::<CurrentUser>()
        .map(Principal::from)
        .unwrap_or_default();
    Access::new(principal, policy)
}

fn parse_uuid(field: &'static str, id: &ID) -> async_graphql::Result<Uuid> {
    Uuid::parse_str(id.as_str())
        .map_err(|_| service_error(ServiceError::invalid(field, "is not a valid id")))
}

fn parse_optional_uuid(
    field: &'static str,
    id: Option<&ID>,
) -> async_graphql::Result<Option<Uuid>> {
    id.map(|value| parse_uuid(field, value)).transpose()
}

fn to_id(id: Uuid) -> ID {
    ID::from(id.to_string())
}

fn service_error(err: ServiceError) -> Error {
    err.extend()
}

fn error_with_code(code: &'static str, message: impl Into<String>) -> Error {
    Error::new(message).extend_with(|_, e| e.set("code", code))
}
