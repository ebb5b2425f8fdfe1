use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: Uuid,
    pub customer_id: Uuid,
    pub agent_id: Option<Uuid>,
    pub total_amount: i64,
    pub shipping_address: String,
    pub status: String,
    pub payment_status: String,
    pub pickup_status: String,
    pub pickup_code: Option<String>,
    pub actual_pickup_date: Option<DateTimeWithTimeZone>,
    pub payment_reference: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::CustomerId",
        to = "super::users::Column::Id"
    )]
    Customer,
    #[sea_orm(has_many = "super::order_items::Entity")]
    OrderItems,
    #[sea_orm(has_many = "super::order_returns::Entity")]
    OrderReturns,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

impl Related<super::order_items::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl Related<super::order_returns::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderReturns.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
