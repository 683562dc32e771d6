//! Tag naming and the business-module tag taxonomy.
//!
//! Tags are plain strings. The engine never validates them against the
//! taxonomy; callers consult it to decide which tags to attach and which to
//! invalidate after a mutation.

/// Prefix of the per-tenant tag.
pub const TENANT_TAG_PREFIX: &str = "tenant:";

/// Prefix of the per-module tag.
pub const MODULE_TAG_PREFIX: &str = "module:";

/// Suffix of the tag shared by every list variant of an entity.
pub const LIST_TAG_SUFFIX: &str = ":list";

/// Suffix of the tag shared by every count variant of an entity.
pub const COUNT_TAG_SUFFIX: &str = ":count";

/// Tag attached to every entry written on behalf of a tenant.
pub fn tenant_tag(tenant_id: &str) -> String {
    format!("{TENANT_TAG_PREFIX}{tenant_id}")
}

/// Tag attached to every entry written under a module namespace.
pub fn module_tag(module: &str) -> String {
    format!("{MODULE_TAG_PREFIX}{module}")
}

/// Tag shared by all cached lists of `entity` (every filter and page).
pub fn list_tag(entity: &str) -> String {
    format!("{entity}{LIST_TAG_SUFFIX}")
}

/// Tag shared by all cached counts of `entity`.
pub fn count_tag(entity: &str) -> String {
    format!("{entity}{COUNT_TAG_SUFFIX}")
}

/// Entity tags owned by each business module.
pub const TAXONOMY: &[(&str, &[&str])] = &[
    ("crm", &["customers", "contacts", "leads", "opportunities", "activities"]),
    ("sales", &["quotes", "orders", "invoices", "payments", "price_lists"]),
    ("inventory", &["products", "categories", "warehouses", "stock_movements", "suppliers"]),
    ("hr", &["employees", "departments", "positions", "leave_requests", "payroll"]),
    ("finance", &["accounts", "journal_entries", "budgets", "expenses", "tax_rates"]),
    ("projects", &["projects", "tasks", "milestones", "timesheets"]),
    ("support", &["tickets", "knowledge_base", "sla_policies"]),
    ("settings", &["companies", "users", "roles", "permissions", "modules"]),
];

/// Entity tags declared by `module`, if the module is known.
pub fn module_tags(module: &str) -> Option<&'static [&'static str]> {
    TAXONOMY
        .iter()
        .find(|(name, _)| *name == module)
        .map(|(_, tags)| *tags)
}

/// The module that declares `tag`, if any.
///
/// The `:list` and `:count` suffixes are ignored, so `orders:list` resolves
/// to the module owning `orders`.
pub fn owning_module(tag: &str) -> Option<&'static str> {
    let entity = tag
        .strip_suffix(LIST_TAG_SUFFIX)
        .or_else(|| tag.strip_suffix(COUNT_TAG_SUFFIX))
        .unwrap_or(tag);
    TAXONOMY
        .iter()
        .find(|(_, tags)| tags.contains(&entity))
        .map(|(name, _)| *name)
}
