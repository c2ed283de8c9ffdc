/*!
 * Per-model database selection.
 *
 * Every query in the site asks `Databases` for a pool by `ModelKind`, and the
 * configured routers decide which alias answers.
 */
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DbAlias {
    Default,
    Secondary,
}

impl DbAlias {
    pub fn as_str(&self) -> &'static str {
        match self {
            DbAlias::Default => "default",
            DbAlias::Secondary => "secondary",
        }
    }
}

impl fmt::Display for DbAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every persisted entity in the site
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModelKind {
    Tag,
    Question,
    Choice,
    User,
    UserPermission,
    Restaurant,
    Topping,
    Pizza,
    PdfFile,
    TablespaceExample,
}

/**
 * A router may claim a model for an alias, or return `None` to let the next
 * router (and finally the default database) decide.
 */
pub trait DatabaseRouter: Send + Sync {
    fn db_for_read(&self, model: ModelKind) -> Option<DbAlias>;
    fn db_for_write(&self, model: ModelKind) -> Option<DbAlias>;
}

/**
 * Sends the learning demo models to the secondary database
 */
#[derive(Clone, Debug)]
pub struct AppRouter {
    related_models: &'static [ModelKind],
}

impl AppRouter {
    pub fn new() -> Self {
        Self {
            related_models: &[
                ModelKind::TablespaceExample,
                ModelKind::Pizza,
                ModelKind::Topping,
                ModelKind::PdfFile,
            ],
        }
    }

    fn route(&self, model: ModelKind) -> Option<DbAlias> {
        if self.related_models.contains(&model) {
            Some(DbAlias::Secondary)
        } else {
            None
        }
    }
}

impl Default for AppRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseRouter for AppRouter {
    fn db_for_read(&self, model: ModelKind) -> Option<DbAlias> {
        self.route(model)
    }

    fn db_for_write(&self, model: ModelKind) -> Option<DbAlias> {
        self.route(model)
    }
}
