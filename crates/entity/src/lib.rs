pub mod cart;
pub mod cart_line;
pub mod category;
pub mod customer_order;
pub mod menu_item;
pub mod purchase;
pub mod purchase_item;
pub mod rating;
pub mod user;
pub mod user_role;
