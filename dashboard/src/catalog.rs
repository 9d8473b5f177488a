//! Static description of every master-data table: which fields the edit form
//! shows, which of them are required, the parent each row hangs off and the
//! association sets it carries.

use std::collections::BTreeMap;

use async_graphql::{Enum, SimpleObject};
use platform_api::{ApiError, ApiResult};
use uuid::Uuid;

use crate::links::dedupe;

const MAX_NAME_LEN: usize = 200;

#[derive(Enum, Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum RecordKind {
    Customer,
    Distributor,
    Partnership,
    Certificate,
    Category,
    SubCategory,
    Brand,
    Product,
    Readiness,
    ProjectType,
}

/// Join tables the generic save path knows how to rewrite.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum LinkKind {
    BrandPartnerships,
    ProductCertificates,
    /// `product_certificates` seen from the certificate side.
    CertificateProducts,
    DistributorProducts,
    UserCertificates,
    ProjectPresales,
    ProjectEngineers,
    ProjectProducts,
}

#[derive(Debug)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub required: bool,
}

#[derive(Debug)]
pub struct ParentSpec {
    pub field: &'static str,
    pub kind: RecordKind,
}

#[derive(Debug)]
pub struct AssociationSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub target: RecordKind,
    pub link: LinkKind,
}

#[derive(Debug)]
pub struct EntitySchema {
    pub kind: RecordKind,
    pub label: &'static str,
    pub table: &'static str,
    pub fields: &'static [FieldSpec],
    pub parent: Option<ParentSpec>,
    pub associations: &'static [AssociationSpec],
}

const BASE_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "name",
        label: "Name",
        required: true,
    },
    FieldSpec {
        name: "description",
        label: "Description",
        required: false,
    },
    FieldSpec {
        name: "is_active",
        label: "Active",
        required: false,
    },
];

macro_rules! child_fields {
    ($field:literal, $label:literal) => {
        &[
            FieldSpec {
                name: "name",
                label: "Name",
                required: true,
            },
            FieldSpec {
                name: $field,
                label: $label,
                required: true,
            },
            FieldSpec {
                name: "description",
                label: "Description",
                required: false,
            },
            FieldSpec {
                name: "is_active",
                label: "Active",
                required: false,
            },
        ]
    };
}

static SCHEMAS: [EntitySchema; 10] = [
    EntitySchema {
        kind: RecordKind::Customer,
        label: "Customer",
        table: "customers",
        fields: BASE_FIELDS,
        parent: None,
        associations: &[],
    },
    EntitySchema {
        kind: RecordKind::Distributor,
        label: "Distributor",
        table: "distributors",
        fields: BASE_FIELDS,
        parent: None,
        associations: &[AssociationSpec {
            name: "products",
            label: "Products",
            target: RecordKind::Product,
            link: LinkKind::DistributorProducts,
        }],
    },
    EntitySchema {
        kind: RecordKind::Partnership,
        label: "Partnership",
        table: "partnerships",
        fields: BASE_FIELDS,
        parent: None,
        associations: &[],
    },
    EntitySchema {
        kind: RecordKind::Certificate,
        label: "Certificate",
        table: "certificates",
        fields: BASE_FIELDS,
        parent: None,
        associations: &[AssociationSpec {
            name: "products",
            label: "Products",
            target: RecordKind::Product,
            link: LinkKind::CertificateProducts,
        }],
    },
    EntitySchema {
        kind: RecordKind::Category,
        label: "Category",
        table: "categories",
        fields: BASE_FIELDS,
        parent: None,
        associations: &[],
    },
    EntitySchema {
        kind: RecordKind::SubCategory,
        label: "Sub-category",
        table: "sub_categories",
        fields: child_fields!("category_id", "Category"),
        parent: Some(ParentSpec {
            field: "category_id",
            kind: RecordKind::Category,
        }),
        associations: &[],
    },
    EntitySchema {
        kind: RecordKind::Brand,
        label: "Brand",
        table: "brands",
        fields: child_fields!("sub_category_id", "Sub-category"),
        parent: Some(ParentSpec {
            field: "sub_category_id",
            kind: RecordKind::SubCategory,
        }),
        associations: &[AssociationSpec {
            name: "partnerships",
            label: "Partnerships",
            target: RecordKind::Partnership,
            link: LinkKind::BrandPartnerships,
        }],
    },
    EntitySchema {
        kind: RecordKind::Product,
        label: "Product",
        table: "products",
        fields: child_fields!("brand_id", "Brand"),
        parent: Some(ParentSpec {
            field: "brand_id",
            kind: RecordKind::Brand,
        }),
        associations: &[AssociationSpec {
            name: "certificates",
            label: "Certificates",
            target: RecordKind::Certificate,
            link: LinkKind::ProductCertificates,
        }],
    },
    EntitySchema {
        kind: RecordKind::Readiness,
        label: "Readiness",
        table: "readiness",
        fields: BASE_FIELDS,
        parent: None,
        associations: &[],
    },
    EntitySchema {
        kind: RecordKind::ProjectType,
        label: "Project type",
        table: "project_types",
        fields: BASE_FIELDS,
        parent: None,
        associations: &[],
    },
];

impl RecordKind {
    pub const ALL: [RecordKind; 10] = [
        RecordKind::Customer,
        RecordKind::Distributor,
        RecordKind::Partnership,
        RecordKind::Certificate,
        RecordKind::Category,
        RecordKind::SubCategory,
        RecordKind::Brand,
        RecordKind::Product,
        RecordKind::Readiness,
        RecordKind::ProjectType,
    ];

    pub fn schema(self) -> &'static EntitySchema {
        &SCHEMAS[self as usize]
    }

    pub fn parent_kind(self) -> Option<RecordKind> {
        self.schema().parent.as_ref().map(|p| p.kind)
    }
}

/// Raw dialog input before validation.
#[derive(Clone, Debug, Default)]
pub struct RecordDraft {
    pub name: String,
    pub description: Option<String>,
    pub is_active: Option<bool>,
    pub parent_id: Option<Uuid>,
    /// Association name to selected ids. Names left out keep their links.
    pub associations: BTreeMap<String, Vec<Uuid>>,
}

/// Draft that passed the schema checks; referenced ids are checked against
/// the database inside the save transaction.
#[derive(Clone, Debug)]
pub struct ValidRecord {
    pub name: String,
    pub description: Option<String>,
    /// `None` keeps the stored flag on edit; inserts default to active.
    pub is_active: Option<bool>,
    pub parent_id: Option<Uuid>,
    pub associations: Vec<(&'static AssociationSpec, Vec<Uuid>)>,
}

impl EntitySchema {
    pub fn validate(&self, draft: RecordDraft) -> ApiResult<ValidRecord> {
        let name = required_text("name", &draft.name)?;
        let description = optional_text(draft.description);

        let parent_id = match (&self.parent, draft.parent_id) {
            (Some(_), Some(id)) => Some(id),
            (Some(parent), None) => {
                return Err(ApiError::invalid(format!(
                    "{} is required",
                    parent.kind.schema().label.to_lowercase()
                )));
            }
            (None, Some(_)) => {
                return Err(ApiError::invalid(format!(
                    "{} records have no parent",
                    self.label.to_lowercase()
                )));
            }
            (None, None) => None,
        };

        let mut associations = Vec::with_capacity(draft.associations.len());
        for (key, ids) in draft.associations {
            let spec = self
                .associations
                .iter()
                .find(|spec| spec.name == key)
                .ok_or_else(|| {
                    ApiError::invalid(format!(
                        "unknown association `{key}` for {}",
                        self.label.to_lowercase()
                    ))
                })?;
            associations.push((spec, dedupe(ids)));
        }

        Ok(ValidRecord {
            name,
            description,
            is_active: draft.is_active,
            parent_id,
            associations,
        })
    }
}

pub(crate) fn required_text(field: &str, value: &str) -> ApiResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::invalid(format!("{field} is required")));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(ApiError::invalid(format!(
            "{field} must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// GraphQL view of an [`EntitySchema`], used by forms.
#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "EntitySchema")]
pub struct SchemaView {
    pub kind: RecordKind,
    pub label: String,
    pub table: String,
    pub fields: Vec<FieldView>,
    pub parent: Option<RecordKind>,
    pub associations: Vec<AssociationSpecView>,
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "FieldSpec")]
pub struct FieldView {
    pub name: String,
    pub label: String,
    pub required: bool,
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "AssociationSpec")]
pub struct AssociationSpecView {
    pub name: String,
    pub label: String,
    pub target: RecordKind,
}

impl From<&EntitySchema> for SchemaView {
    fn from(schema: &EntitySchema) -> Self {
        Self {
            kind: schema.kind,
            label: schema.label.to_string(),
            table: schema.table.to_string(),
            fields: schema
                .fields
                .iter()
                .map(|f| FieldView {
                    name: f.name.to_string(),
                    label: f.label.to_string(),
                    required: f.required,
                })
                .collect(),
            parent: schema.parent.as_ref().map(|p| p.kind),
            associations: schema
                .associations
                .iter()
                .map(|a| AssociationSpecView {
                    name: a.name.to_string(),
                    label: a.label.to_string(),
                    target: a.target,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_table_is_indexed_by_kind() {
        for kind in RecordKind::ALL {
            assert_eq!(kind.schema().kind, kind);
        }
    }

    #[test]
    fn lineage_chain_ends_at_category() {
        assert_eq!(RecordKind::Product.parent_kind(), Some(RecordKind::Brand));
        assert_eq!(RecordKind::Brand.parent_kind(), Some(RecordKind::SubCategory));
        assert_eq!(
            RecordKind::SubCategory.parent_kind(),
            Some(RecordKind::Category)
        );
        assert_eq!(RecordKind::Category.parent_kind(), None);
    }

    #[test]
    fn blank_name_is_rejected() {
        let err = RecordKind::Customer
            .schema()
            .validate(RecordDraft {
                name: "   ".into(),
                ..RecordDraft::default()
            })
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION");
    }

    #[test]
    fn child_kinds_require_a_parent() {
        let err = RecordKind::Brand
            .schema()
            .validate(RecordDraft {
                name: "Acme".into(),
                ..RecordDraft::default()
            })
            .unwrap_err();
        assert_eq!(err.to_string(), "sub-category is required");
    }

    #[test]
    fn top_level_kinds_reject_a_parent() {
        let err = RecordKind::Customer
            .schema()
            .validate(RecordDraft {
                name: "Globex".into(),
                parent_id: Some(Uuid::new_v4()),
                ..RecordDraft::default()
            })
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION");
    }

    #[test]
    fn unknown_association_is_rejected() {
        let mut associations = BTreeMap::new();
        associations.insert("certificates".to_string(), vec![Uuid::new_v4()]);
        let err = RecordKind::Brand
            .schema()
            .validate(RecordDraft {
                name: "Acme".into(),
                parent_id: Some(Uuid::new_v4()),
                associations,
                ..RecordDraft::default()
            })
            .unwrap_err();
        assert!(err.to_string().contains("unknown association"));
    }

    #[test]
    fn valid_draft_is_trimmed_and_deduplicated() {
        let gold = Uuid::new_v4();
        let mut associations = BTreeMap::new();
        associations.insert("partnerships".to_string(), vec![gold, gold]);
        let record = RecordKind::Brand
            .schema()
            .validate(RecordDraft {
                name: "  Acme ".into(),
                description: Some("   ".into()),
                is_active: None,
                parent_id: Some(Uuid::new_v4()),
                associations,
            })
            .unwrap();
        assert_eq!(record.name, "Acme");
        assert_eq!(record.description, None);
        assert_eq!(record.is_active, None);
        assert_eq!(record.associations.len(), 1);
        assert_eq!(record.associations[0].0.link, LinkKind::BrandPartnerships);
        assert_eq!(record.associations[0].1, vec![gold]);
    }
}
