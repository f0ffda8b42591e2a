//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod background_job;
pub mod gift_card;
pub mod gift_card_plot;
pub mod gift_card_request;
pub mod gift_request_user;
pub mod plant_type_template;
pub mod tree;
pub mod user;

// Re-export specific types to avoid conflicts
pub use background_job::{
    Column as BackgroundJobColumn, Entity as BackgroundJob, Model as BackgroundJobModel,
};
pub use gift_card::{Column as GiftCardColumn, Entity as GiftCard, Model as GiftCardModel};
pub use gift_card_plot::{
    Column as GiftCardPlotColumn, Entity as GiftCardPlot, Model as GiftCardPlotModel,
};
pub use gift_card_request::{
    Column as GiftCardRequestColumn, Entity as GiftCardRequest, Model as GiftCardRequestModel,
};
pub use gift_request_user::{
    Column as GiftRequestUserColumn, Entity as GiftRequestUser, Model as GiftRequestUserModel,
};
pub use plant_type_template::{
    Column as PlantTypeTemplateColumn, Entity as PlantTypeTemplate, Model as PlantTypeTemplateModel,
};
pub use tree::{Column as TreeColumn, Entity as Tree, Model as TreeModel};
pub use user::{Column as UserColumn, Entity as User, Model as UserModel};
