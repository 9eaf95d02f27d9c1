//! Per-collection field schemas and the schema registry.
//!
//! Schemas are defined at startup and never change. They serve two
//! purposes: the field block is rendered into the planner prompt so the
//! model can emit valid filters, and the allow-list prunes returned
//! payloads before they leave the fusion engine.

use std::collections::HashMap;

/// Payload field carrying the cross-collection document identifier.
pub const DOC_ID_FIELD: &str = "doc_id";

/// Value substituted when a curated result has no doc_id after projection.
/// Callers must always be able to key on the doc_id field.
pub const DOC_ID_SENTINEL: &str = "Document not available in local database.";

/// Field value kinds the planner may filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Keyword,
    Text,
    Datetime,
    Uuid,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Keyword => "KEYWORD",
            FieldKind::Text => "TEXT",
            FieldKind::Datetime => "DATETIME",
            FieldKind::Uuid => "UUID",
        }
    }
}

/// One filterable field: name, kind, and (for closed vocabularies) the
/// allowed values.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
    pub values: &'static [&'static str],
}

impl FieldDescriptor {
    const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            values: &[],
        }
    }

    const fn with_values(
        name: &'static str,
        kind: FieldKind,
        values: &'static [&'static str],
    ) -> Self {
        Self { name, kind, values }
    }
}

/// Immutable description of one collection.
#[derive(Debug, Clone)]
pub struct CollectionSchema {
    pub name: &'static str,
    pub fields: &'static [FieldDescriptor],
    /// Output projection allow-list. Empty means payload passthrough.
    pub allowed_fields: &'static [&'static str],
}

impl CollectionSchema {
    /// The uncurated collection presents an empty schema to the planner,
    /// signalling that no filter is wanted.
    pub const fn empty(name: &'static str) -> Self {
        Self {
            name,
            fields: &[],
            allowed_fields: &[],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn allows(&self, field: &str) -> bool {
        self.allowed_fields.iter().any(|f| *f == field)
    }

    /// Render the field block for the planner prompt, one line per field:
    /// `- name - KIND ['a' 'b']`.
    pub fn field_block(&self) -> String {
        let mut block = String::new();
        for field in self.fields {
            block.push_str("- ");
            block.push_str(field.name);
            block.push_str(" - ");
            block.push_str(field.kind.as_str());
            if !field.values.is_empty() {
                block.push_str(" [");
                for (i, v) in field.values.iter().enumerate() {
                    if i > 0 {
                        block.push(' ');
                    }
                    block.push('\'');
                    block.push_str(v);
                    block.push('\'');
                }
                block.push(']');
            }
            block.push('\n');
        }
        block
    }
}

static BP_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::with_values(
        "format",
        FieldKind::Keyword,
        &["Website", "Document", "Video", "Multiple"],
    ),
    FieldDescriptor::new("district", FieldKind::Text),
    FieldDescriptor::new("year", FieldKind::Datetime),
    FieldDescriptor::with_values(
        "continent",
        FieldKind::Text,
        &[
            "Asia",
            "Africa",
            "Multiple",
            "South America",
            "Australia",
            "Europe",
            "North America",
        ],
    ),
    FieldDescriptor::new("brief_description", FieldKind::Text),
    FieldDescriptor::with_values(
        "state",
        FieldKind::Text,
        &[
            "UTTARAKHAND",
            "PAN-INDIA",
            "UTTAR PRADESH",
            "BIHAR",
            "PUDUCHERRY",
            "ARUNACHAL PRADESH",
            "ASSAM",
            "THE DADRA AND NAGAR HAVELI AND DAMAN AND DIU",
            "GUJARAT",
            "SIKKIM",
            "HIMACHAL PRADESH",
            "JHARKHAND",
            "TRIPURA",
            "JAMMU & KASHMIR",
            "MIZORAM",
            "HARYANA",
            "PUNJAB",
            "GOA",
            "ODISHA",
            "LAKSHADWEEP",
            "KARNATAKA",
            "NAGALAND",
            "MULTIPLE STATES",
            "KERALA",
            "MANIPUR",
            "ANDHRA PRADESH",
            "MAHARASHTRA",
            "TELANGANA",
            "DELHI",
            "MEGHALAYA",
            "LADAKH",
            "RAJASTHAN",
            "LEH",
            "CHANDIGARH",
            "CHHATTISGARH",
            "TAMIL NADU",
            "MADHYA PRADESH",
            "WEST BENGAL",
            "ANDAMAN AND NICOBAR ISLANDS",
        ],
    ),
    FieldDescriptor::new("name_of_best_practice", FieldKind::Text),
    FieldDescriptor::new("village_city", FieldKind::Text),
    FieldDescriptor::with_values("nation", FieldKind::Keyword, &["India", "International"]),
    FieldDescriptor::new("country", FieldKind::Text),
    FieldDescriptor::new("sector", FieldKind::Keyword),
    FieldDescriptor::new("panchayat", FieldKind::Text),
    FieldDescriptor::new("topic", FieldKind::Text),
    FieldDescriptor::new("source", FieldKind::Text),
    FieldDescriptor::new("doc_id", FieldKind::Uuid),
];

static BP_ALLOWED: &[&str] = &[
    "id",
    "name_of_best_practice",
    "brief_description",
    "source",
    "Link",
    "format",
    "sector",
    "topic",
    "nation",
    "country",
    "continent",
    "state",
    "district",
    "panchayat",
    "village_city",
    "year",
    "individual_case",
    "doc_id",
];

static POL_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::with_values(
        "parent_organisation_type",
        FieldKind::Text,
        &["Department", "Ministry"],
    ),
    FieldDescriptor::with_values(
        "state_name",
        FieldKind::Text,
        &[
            "ANDAMAN AND NICOBAR ISLANDS",
            "ANDHRA PRADESH",
            "TELANGANA",
            "ARUNACHAL PRADESH",
            "ASSAM",
            "BIHAR",
            "CHHATTISGARH",
            "DELHI",
            "GOA",
            "GUJARAT",
            "HARYANA",
            "HIMACHAL PRADESH",
            "JAMMU AND KASHMIR",
            "JHARKHAND",
            "KARNATAKA",
            "KERALA",
            "LADAKH",
            "MADHYA PRADESH",
            "MAHARASHTRA",
            "MANIPUR",
            "MEGHALAYA",
            "MIZORAM",
            "NAGALAND",
            "ODISHA",
            "PUDUCHERRY",
            "PUNJAB",
            "RAJASTHAN",
            "SIKKIM",
            "TAMIL NADU",
            "THE DADRA AND NAGAR HAVELI AND DAMAN AND DIU",
            "TRIPURA",
            "UTTAR PRADESH",
            "UTTARAKHAND",
            "WEST BENGAL",
        ],
    ),
    FieldDescriptor::with_values(
        "sdg_goal",
        FieldKind::Text,
        &[
            "GOAL 15: Life on Land",
            "GOAL 14: Life Below Water",
            "GOAL 2: Zero Hunger",
            "GOAL 1: No Poverty",
            "GOAL 9: Industry, Innovation and Infrastructure",
            "GOAL 8: Decent Work and Economic Growth",
            "GOAL 12: Responsible Consumption and Production",
            "GOAL 7: Affordable and Clean Energy",
            "GOAL 4: Quality Education",
            "GOAL 6: Clean Water and Sanitation",
            "GOAL 17: Partnerships to achieve the Goal",
            "GOAL 13: Climate Action",
            "GOAL 11: Sustainable Cities and Communities",
            "GOAL 3: Good Health and Well-being",
            "GOAL 10: Reduced Inequality",
            "GOAL 5: Gender Equality",
        ],
    ),
    FieldDescriptor::new("description", FieldKind::Text),
    FieldDescriptor::new("organisation_name", FieldKind::Text),
    FieldDescriptor::with_values(
        "organisation_type",
        FieldKind::Text,
        &["Department", "Organization", "Ministry"],
    ),
    FieldDescriptor::new("year_mm_yyyy", FieldKind::Datetime),
    FieldDescriptor::with_values(
        "institution_type",
        FieldKind::Text,
        &[
            "State government department",
            "Think-tanks",
            "Govt research institute",
            "Multilaterals",
            "Central Government Ministry",
            "Autonomous Bodies",
            "Central government ministry",
            "Academic",
        ],
    ),
    FieldDescriptor::with_values("geo_level", FieldKind::Text, &["State", "National", "Global"]),
    FieldDescriptor::with_values(
        "content_type",
        FieldKind::Text,
        &[
            "Act",
            "Scheme",
            "Guidelines and Action Plans",
            "Act (Amendment)",
            "Implementation Agency",
            "Research Report",
            "Programme",
            "Rules/Regulations",
            "Bill",
            "Toolkits/Modules",
            "Policy",
            "Rules/regulations",
        ],
    ),
    FieldDescriptor::with_values(
        "language",
        FieldKind::Text,
        &[
            "English",
            "Telugu",
            "English, Hindi",
            "Gujarati",
            "Hindi",
            "Kannada",
            "Marathi",
            "English, Marathi",
            "Bengali",
        ],
    ),
    FieldDescriptor::new("source", FieldKind::Text),
    FieldDescriptor::new("beneficiary_type", FieldKind::Text),
    FieldDescriptor::new("doc_id", FieldKind::Uuid),
    FieldDescriptor::new("sector", FieldKind::Text),
    FieldDescriptor::new("district_name", FieldKind::Text),
    FieldDescriptor::with_values("file_format", FieldKind::Keyword, &["PDF", "HTML"]),
    FieldDescriptor::new("content_name", FieldKind::Text),
    FieldDescriptor::new("parent_organisation_name", FieldKind::Text),
];

static POL_ALLOWED: &[&str] = &[
    "id",
    "Content Name ",
    "content_type",
    "geo_level",
    "institution_type",
    "state_name",
    "district_name",
    "organisation_name",
    "organisation_type",
    "parent_organisation_name",
    "parent_organisation_type",
    "sector",
    "sdg_goal",
    "beneficiary_type",
    "source",
    "year_mm_yyyy",
    "description",
    "hyperlink",
    "file_format",
    "language",
    "doc_id",
];

/// Registry of all known collections. Immutable after startup and shared
/// behind an `Arc`.
#[derive(Debug)]
pub struct SchemaRegistry {
    schemas: HashMap<&'static str, CollectionSchema>,
    uncurated: &'static str,
    content_collection: &'static str,
}

impl SchemaRegistry {
    /// The standard collection set: two curated collections, one
    /// uncurated raw-data collection, and the unified content collection
    /// used for QnA resolution.
    pub fn standard() -> Self {
        let mut schemas = HashMap::new();
        schemas.insert(
            "best_practices",
            CollectionSchema {
                name: "best_practices",
                fields: BP_FIELDS,
                allowed_fields: BP_ALLOWED,
            },
        );
        schemas.insert(
            "policies",
            CollectionSchema {
                name: "policies",
                fields: POL_FIELDS,
                allowed_fields: POL_ALLOWED,
            },
        );
        schemas.insert("data", CollectionSchema::empty("data"));
        schemas.insert("docs", CollectionSchema::empty("docs"));

        Self {
            schemas,
            uncurated: "data",
            content_collection: "docs",
        }
    }

    pub fn get(&self, name: &str) -> Option<&CollectionSchema> {
        self.schemas.get(name)
    }

    pub fn is_uncurated(&self, name: &str) -> bool {
        name == self.uncurated
    }

    /// The single collection holding document content chunks.
    pub fn content_collection(&self) -> &'static str {
        self.content_collection
    }

    /// Output allow-list for a collection. None means payload passthrough
    /// (the uncurated and content collections).
    pub fn allow_list(&self, name: &str) -> Option<&'static [&'static str]> {
        self.schemas
            .get(name)
            .filter(|s| !s.allowed_fields.is_empty())
            .map(|s| s.allowed_fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry_collections() {
        let registry = SchemaRegistry::standard();
        assert!(registry.get("best_practices").is_some());
        assert!(registry.get("policies").is_some());
        assert!(registry.get("data").is_some());
        assert!(registry.get("unknown").is_none());
        assert!(registry.is_uncurated("data"));
        assert!(!registry.is_uncurated("policies"));
        assert_eq!(registry.content_collection(), "docs");
    }

    #[test]
    fn test_allow_list_only_for_curated() {
        let registry = SchemaRegistry::standard();
        assert!(registry.allow_list("best_practices").is_some());
        assert!(registry.allow_list("policies").is_some());
        assert!(registry.allow_list("data").is_none());
        assert!(registry.allow_list("docs").is_none());
    }

    #[test]
    fn test_field_block_rendering() {
        let registry = SchemaRegistry::standard();
        let block = registry.get("best_practices").unwrap().field_block();
        assert!(block.contains("- year - DATETIME"));
        assert!(block.contains("- format - KEYWORD ['Website' 'Document' 'Video' 'Multiple']"));
        assert!(block.contains("- doc_id - UUID"));
    }

    #[test]
    fn test_empty_schema_renders_empty_block() {
        let registry = SchemaRegistry::standard();
        let data = registry.get("data").unwrap();
        assert!(data.is_empty());
        assert_eq!(data.field_block(), "");
    }

    #[test]
    fn test_curated_allow_lists_contain_doc_id() {
        let registry = SchemaRegistry::standard();
        assert!(registry.get("best_practices").unwrap().allows("doc_id"));
        assert!(registry.get("policies").unwrap().allows("doc_id"));
        assert!(!registry.get("best_practices").unwrap().allows("embedding"));
    }
}
