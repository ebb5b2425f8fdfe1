pub mod audit_logs;
pub mod order_items;
pub mod order_returns;
pub mod orders;
pub mod payouts;
pub mod products;
pub mod users;

pub use audit_logs::Entity as AuditLogs;
pub use order_items::Entity as OrderItems;
pub use order_returns::Entity as OrderReturns;
pub use orders::Entity as Orders;
pub use payouts::Entity as Payouts;
pub use products::Entity as Products;
pub use users::Entity as Users;
