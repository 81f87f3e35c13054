use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Per-user quota and embed customisation.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user_settings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: String,
    pub max_file_size: i64,
    pub max_storage: Option<i64>,
    #[sea_orm(default_expr = "Expr::value(0)")]
    pub storage_used: i64,
    #[sea_orm(default_expr = "Expr::value(false)")]
    pub use_word_codes: bool,
    /// One word per line
    #[sea_orm(column_type = "Text", nullable)]
    pub custom_words: Option<String>,
    pub embed_title: Option<String>,
    pub embed_author: Option<String>,
    pub embed_footer: Option<String>,
    pub embed_color: Option<String>,
    #[sea_orm(default_expr = "Expr::value(false)")]
    pub show_stats: bool,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// Parsed custom word list, empty when unset.
    ///
    /// Only ASCII alphanumeric words are kept: codes end up as a single URL path
    /// segment and a storage object name, where `.` marks an extension and
    /// `_` could form the thumbnail prefix.
    pub fn word_list(&self) -> Vec<String> {
        self.custom_words
            .as_deref()
            .unwrap_or_default()
            .split(|c: char| c == '\n' || c == ',')
            .map(str::trim)
            .filter(|w| is_code_word(w))
            .map(str::to_string)
            .collect()
    }
}

/// Longest word accepted into a word-based code
pub const MAX_CODE_WORD_LEN: usize = 32;

fn is_code_word(word: &str) -> bool {
    !word.is_empty()
        && word.len() <= MAX_CODE_WORD_LEN
        && word.bytes().all(|b| b.is_ascii_alphanumeric())
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Users,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
