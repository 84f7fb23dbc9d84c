// SeaORM entities for the thread engine: comments, their mention rows,
// and the read-only projection of the external user directory.

pub mod comment;
pub mod comment_mention;
pub mod directory_user;


pub mod prelude {
    // Re-export all entities for convenience
    pub use super::comment::{
        ActiveModel as CommentActiveModel, Column as CommentColumn, Entity as Comment,
        Model as CommentModel,
    };
    pub use super::comment_mention::{
        ActiveModel as CommentMentionActiveModel, Column as CommentMentionColumn,
        Entity as CommentMention, Model as CommentMentionModel,
    };
    pub use super::directory_user::{
        ActiveModel as DirectoryUserActiveModel, Column as DirectoryUserColumn,
        Entity as DirectoryUser, Model as DirectoryUserModel,
    };

    // Re-export commonly used SeaORM types and traits
    pub use sea_orm::{
        ActiveModelTrait,
        ActiveValue,
        ColumnTrait,
        ConnectionTrait,

        // Database and connection types
        Database,
        DatabaseConnection,
        DbConn,
        // Common result types
        DbErr,

        // Core traits
        EntityTrait,
        ModelTrait,
        NotSet,
        PaginatorTrait,
        QueryFilter,
        QueryOrder,
        QuerySelect,
        Related,
        RelationTrait,
        // Active model helpers
        Set,
        TransactionTrait,
        Unchanged,
    };
}
