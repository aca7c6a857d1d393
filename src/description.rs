use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domain::{CommitId, IdType, SchemaVersion, VersionSelector, WorkspaceUrl};
use crate::error::DatamakerError;

/// Where a descriptor field takes its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    MetadataVersion,
    DatasetType,
    Title,
    Description,
    Keywords,
    Funding,
    Acknowledgements,
    ContributorNames,
    ContributorOrcids,
    ContributorAffiliations,
    ContributorRoles,
    ContactPersons,
    LinkUrls,
    LinkDescriptions,
    IdentifierDescriptions,
    RelationTypes,
    Identifiers,
    IdentifierTypes,
    NumberOfSubjects,
    NumberOfSamples,
    Empty,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub source: FieldSource,
}

const fn field(name: &'static str, source: FieldSource) -> FieldSpec {
    FieldSpec { name, source }
}

const V1_2_3_FIELDS: &[FieldSpec] = &[
    field("Name", FieldSource::Title),
    field("Description", FieldSource::Description),
    field("Keywords", FieldSource::Keywords),
    field("Contributors", FieldSource::ContributorNames),
    field("Contributor ORCID ID", FieldSource::ContributorOrcids),
    field("Contributor Affiliation", FieldSource::ContributorAffiliations),
    field("Contributor Role", FieldSource::ContributorRoles),
    field("Is Contact Person", FieldSource::ContactPersons),
    field("Acknowledgements", FieldSource::Acknowledgements),
    field("Funding", FieldSource::Funding),
    field("Originating Article DOI", FieldSource::Empty),
    field("Protocol URL or DOI", FieldSource::Empty),
    field("Additional Links", FieldSource::LinkUrls),
    field("Link Description", FieldSource::LinkDescriptions),
    field("Number of subjects", FieldSource::NumberOfSubjects),
    field("Number of samples", FieldSource::NumberOfSamples),
    field("Completeness of data set", FieldSource::Empty),
    field("Parent dataset ID", FieldSource::Empty),
    field("Title for complete data set", FieldSource::Title),
    field("Metadata Version DO NOT CHANGE", FieldSource::MetadataVersion),
];

const V2_0_0_FIELDS: &[FieldSpec] = &[
    field("Metadata Version", FieldSource::MetadataVersion),
    field("Type", FieldSource::DatasetType),
    field("Title", FieldSource::Title),
    field("Keywords", FieldSource::Keywords),
    field("Funding", FieldSource::Funding),
    field("Acknowledgments", FieldSource::Acknowledgements),
    field("Study purpose", FieldSource::Description),
    field("Study data collection", FieldSource::Empty),
    field("Study primary conclusion", FieldSource::Empty),
    field("Study organ system", FieldSource::Empty),
    field("Study approach", FieldSource::Empty),
    field("Study technique", FieldSource::Empty),
    field("Study collection title", FieldSource::Empty),
    field("Contributor name", FieldSource::ContributorNames),
    field("Contributor ORCiD", FieldSource::ContributorOrcids),
    field("Contributor affiliation", FieldSource::ContributorAffiliations),
    field("Contributor role", FieldSource::ContributorRoles),
    field("Identifier description", FieldSource::IdentifierDescriptions),
    field("Relation type", FieldSource::RelationTypes),
    field("Identifier", FieldSource::Identifiers),
    field("Identifier type", FieldSource::IdentifierTypes),
    field("Number of subjects", FieldSource::NumberOfSubjects),
    field("Number of samples", FieldSource::NumberOfSamples),
];

const V2_1_0_FIELDS: &[FieldSpec] = &[
    field("Metadata Version", FieldSource::MetadataVersion),
    field("Type", FieldSource::DatasetType),
    field("Title", FieldSource::Title),
    field("Subtitle", FieldSource::Description),
    field("Keywords", FieldSource::Keywords),
    field("Funding", FieldSource::Funding),
    field("Acknowledgments", FieldSource::Acknowledgements),
    field("Study purpose", FieldSource::Description),
    field("Study data collection", FieldSource::Empty),
    field("Study primary conclusion", FieldSource::Empty),
    field("Study organ system", FieldSource::Empty),
    field("Study approach", FieldSource::Empty),
    field("Study technique", FieldSource::Empty),
    field("Study collection title", FieldSource::Empty),
    field("Contributor name", FieldSource::ContributorNames),
    field("Contributor ORCiD", FieldSource::ContributorOrcids),
    field("Contributor affiliation", FieldSource::ContributorAffiliations),
    field("Contributor role", FieldSource::ContributorRoles),
    field("Identifier description", FieldSource::IdentifierDescriptions),
    field("Relation type", FieldSource::RelationTypes),
    field("Identifier", FieldSource::Identifiers),
    field("Identifier type", FieldSource::IdentifierTypes),
    field("Number of subjects", FieldSource::NumberOfSubjects),
    field("Number of samples", FieldSource::NumberOfSamples),
];

const DATASET_TYPE: &str = "computational";

#[derive(Debug, Clone)]
pub struct SchemaTemplate {
    pub version: SchemaVersion,
    pub fields: &'static [FieldSpec],
}

#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    templates: Vec<SchemaTemplate>,
}

impl SchemaRegistry {
    pub fn builtin() -> Self {
        Self {
            templates: vec![
                SchemaTemplate {
                    version: SchemaVersion::new(1, 2, 3),
                    fields: V1_2_3_FIELDS,
                },
                SchemaTemplate {
                    version: SchemaVersion::new(2, 0, 0),
                    fields: V2_0_0_FIELDS,
                },
                SchemaTemplate {
                    version: SchemaVersion::new(2, 1, 0),
                    fields: V2_1_0_FIELDS,
                },
            ],
        }
    }

    /// `Latest` picks the numerically highest known version, not the
    /// lexicographically highest string.
    pub fn resolve(&self, selector: VersionSelector) -> Result<&SchemaTemplate, DatamakerError> {
        let template = match selector {
            VersionSelector::Latest => self.templates.iter().max_by_key(|t| t.version),
            VersionSelector::Explicit(version) => {
                self.templates.iter().find(|t| t.version == version)
            }
        };
        template.ok_or_else(|| DatamakerError::UnknownVersion(selector.to_string()))
    }

    pub fn build(
        &self,
        selector: VersionSelector,
        inputs: &DescriptionInputs,
    ) -> Result<DescriptorRecord, DatamakerError> {
        Ok(self.resolve(selector)?.populate(inputs))
    }
}

/// The flatmap author's description file referenced from the manifest.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlatmapDescription {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub contributors: Vec<Contributor>,
    #[serde(default)]
    pub funding: Option<OneOrMany>,
    #[serde(default, alias = "acknowledgments")]
    pub acknowledgements: Option<String>,
}

impl FlatmapDescription {
    pub fn parse(file: &str, bytes: &[u8]) -> Result<Self, DatamakerError> {
        serde_json::from_slice(bytes).map_err(|err| DatamakerError::MalformedDescription {
            file: file.to_string(),
            message: err.to_string(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Contributor {
    pub name: String,
    #[serde(default)]
    pub orcid: Option<String>,
    #[serde(default)]
    pub affiliation: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn to_vec(&self) -> Vec<String> {
        match self {
            OneOrMany::One(value) => vec![value.clone()],
            OneOrMany::Many(values) => values.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalLink {
    pub url: String,
    pub description: String,
}

pub fn default_additional_links() -> Vec<AdditionalLink> {
    [
        (
            "https://github.com/AnatomicMaps/flatmap-maker",
            "Generate flatmaps for viewing",
        ),
        (
            "https://github.com/AnatomicMaps/flatmap-server",
            "Server for generated flatmaps",
        ),
        (
            "https://github.com/AnatomicMaps/flatmap-viewer",
            "View generated flatmaps",
        ),
    ]
    .into_iter()
    .map(|(url, description)| AdditionalLink {
        url: url.to_string(),
        description: description.to_string(),
    })
    .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetIdentity {
    pub id: String,
    pub id_type: IdType,
}

impl DatasetIdentity {
    /// An explicit id wins; otherwise URL ids name the workspace and UUID ids
    /// are derived from the commit and the manifest content.
    pub fn resolve(
        id: Option<&str>,
        id_type: IdType,
        workspace: &WorkspaceUrl,
        commit: &CommitId,
        manifest_bytes: &[u8],
    ) -> Self {
        let id = match (id, id_type) {
            (Some(id), _) => id.to_string(),
            (None, IdType::Url) => workspace.as_str().to_string(),
            (None, IdType::Uuid) => {
                let mut name = commit.as_str().as_bytes().to_vec();
                name.extend_from_slice(manifest_bytes);
                Uuid::new_v5(&Uuid::NAMESPACE_URL, &name).to_string()
            }
        };
        Self { id, id_type }
    }
}

#[derive(Debug, Clone)]
pub struct DescriptionInputs {
    pub description: Option<FlatmapDescription>,
    pub identity: DatasetIdentity,
    pub additional_links: Vec<AdditionalLink>,
    pub number_of_subjects: u64,
    pub number_of_samples: u64,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DescriptorRecord {
    pub metadata_version: String,
    pub generated_at: String,
    pub fields: Map<String, Value>,
}

impl DescriptorRecord {
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.keys().map(String::as_str).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, DatamakerError> {
        serde_json::to_vec_pretty(self).map_err(|err| DatamakerError::Write {
            path: "dataset_description.json".to_string(),
            message: err.to_string(),
        })
    }
}

impl SchemaTemplate {
    pub fn populate(&self, inputs: &DescriptionInputs) -> DescriptorRecord {
        let mut fields = Map::new();
        for spec in self.fields {
            fields.insert(spec.name.to_string(), self.value_of(spec.source, inputs));
        }
        DescriptorRecord {
            metadata_version: self.version.to_string(),
            generated_at: inputs
                .generated_at
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            fields,
        }
    }

    fn value_of(&self, source: FieldSource, inputs: &DescriptionInputs) -> Value {
        let description = inputs.description.as_ref();
        let contributors = description
            .map(|d| d.contributors.as_slice())
            .unwrap_or_default();
        let links = &inputs.additional_links;
        let identity = &inputs.identity;
        match source {
            FieldSource::MetadataVersion => Value::from(self.version.to_string()),
            FieldSource::DatasetType => Value::from(DATASET_TYPE),
            FieldSource::Title => text(description.map(|d| d.title.clone())),
            FieldSource::Description => text(description.map(|d| d.description.clone())),
            FieldSource::Keywords => list(description.map(|d| d.keywords.clone()).unwrap_or_default()),
            FieldSource::Funding => list(
                description
                    .and_then(|d| d.funding.as_ref())
                    .map(OneOrMany::to_vec)
                    .unwrap_or_default(),
            ),
            FieldSource::Acknowledgements => {
                text(description.and_then(|d| d.acknowledgements.clone()))
            }
            FieldSource::ContributorNames => {
                list(contributors.iter().map(|c| c.name.clone()).collect())
            }
            FieldSource::ContributorOrcids => list(
                contributors
                    .iter()
                    .map(|c| c.orcid.clone().unwrap_or_default())
                    .collect(),
            ),
            FieldSource::ContributorAffiliations => list(
                contributors
                    .iter()
                    .map(|c| c.affiliation.clone().unwrap_or_default())
                    .collect(),
            ),
            FieldSource::ContributorRoles => list(
                contributors
                    .iter()
                    .map(|c| c.role.clone().unwrap_or_default())
                    .collect(),
            ),
            FieldSource::ContactPersons => list(
                contributors
                    .iter()
                    .map(|c| c.contact.clone().unwrap_or_else(|| "Yes".to_string()))
                    .collect(),
            ),
            FieldSource::LinkUrls => list(links.iter().map(|l| l.url.clone()).collect()),
            FieldSource::LinkDescriptions => {
                list(links.iter().map(|l| l.description.clone()).collect())
            }
            FieldSource::IdentifierDescriptions => list(
                std::iter::once("flatmap workspace".to_string())
                    .chain(links.iter().map(|l| l.description.clone()))
                    .collect(),
            ),
            FieldSource::RelationTypes => list(
                std::iter::once("IsDerivedFrom".to_string())
                    .chain(links.iter().map(|_| "IsDocumentedBy".to_string()))
                    .collect(),
            ),
            FieldSource::Identifiers => list(
                std::iter::once(identity.id.clone())
                    .chain(links.iter().map(|l| l.url.clone()))
                    .collect(),
            ),
            FieldSource::IdentifierTypes => list(
                std::iter::once(identity.id_type.to_string())
                    .chain(links.iter().map(|_| IdType::Url.to_string()))
                    .collect(),
            ),
            FieldSource::NumberOfSubjects => Value::from(inputs.number_of_subjects),
            FieldSource::NumberOfSamples => Value::from(inputs.number_of_samples),
            FieldSource::Empty => Value::from(""),
        }
    }
}

fn text(value: Option<String>) -> Value {
    Value::from(value.unwrap_or_default())
}

/// Single values stay scalar so one-contributor datasets read naturally.
fn list(values: Vec<String>) -> Value {
    match values.len() {
        0 => Value::from(""),
        1 => Value::from(values.into_iter().next().unwrap_or_default()),
        _ => Value::Array(values.into_iter().map(Value::from).collect()),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    use super::*;

    fn inputs() -> DescriptionInputs {
        let description = FlatmapDescription::parse(
            "description.json",
            br#"{
                "title": "Rat flatmap",
                "description": "A flatmap of the rat",
                "keywords": ["rat", "flatmap"],
                "contributors": [
                    {"name": "Ada", "affiliation": "ABI", "role": "Creator"}
                ],
                "funding": "OT2OD025340"
            }"#,
        )
        .unwrap();
        DescriptionInputs {
            description: Some(description),
            identity: DatasetIdentity {
                id: "https://example.org/ws/1".to_string(),
                id_type: IdType::Url,
            },
            additional_links: default_additional_links(),
            number_of_subjects: 0,
            number_of_samples: 0,
            generated_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn latest_selects_highest_version() {
        let registry = SchemaRegistry::builtin();
        let template = registry.resolve(VersionSelector::Latest).unwrap();
        assert_eq!(template.version, SchemaVersion::new(2, 1, 0));
    }

    #[test]
    fn unknown_version_fails() {
        let registry = SchemaRegistry::builtin();
        let err = registry
            .resolve(VersionSelector::Explicit(SchemaVersion::new(9, 9, 9)))
            .unwrap_err();
        assert_matches!(err, DatamakerError::UnknownVersion(v) if v == "9.9.9");
    }

    #[test]
    fn version_1_2_3_layout() {
        let registry = SchemaRegistry::builtin();
        let record = registry
            .build(
                VersionSelector::Explicit(SchemaVersion::new(1, 2, 3)),
                &inputs(),
            )
            .unwrap();
        let names = V1_2_3_FIELDS.iter().map(|f| f.name).collect::<Vec<_>>();
        assert_eq!(record.field_names(), names);
        assert_eq!(record.get("Name"), Some(&Value::from("Rat flatmap")));
        assert_eq!(
            record.get("Metadata Version DO NOT CHANGE"),
            Some(&Value::from("1.2.3"))
        );
        assert_eq!(record.get("Is Contact Person"), Some(&Value::from("Yes")));
        assert_eq!(record.generated_at, "2024-05-01T12:00:00Z");
    }

    #[test]
    fn related_identifiers_lead_with_dataset_id() {
        let record = SchemaRegistry::builtin()
            .build(VersionSelector::Latest, &inputs())
            .unwrap();
        let identifiers = record.get("Identifier").and_then(Value::as_array).unwrap();
        assert_eq!(identifiers[0], Value::from("https://example.org/ws/1"));
        assert_eq!(identifiers.len(), 1 + default_additional_links().len());
    }

    #[test]
    fn populate_without_description_leaves_blanks() {
        let mut inputs = inputs();
        inputs.description = None;
        let record = SchemaRegistry::builtin()
            .build(VersionSelector::Latest, &inputs)
            .unwrap();
        assert_eq!(record.get("Title"), Some(&Value::from("")));
        assert_eq!(record.get("Number of subjects"), Some(&Value::from(0u64)));
    }

    #[test]
    fn description_requires_title() {
        let err = FlatmapDescription::parse("d.json", br#"{"description": "x"}"#).unwrap_err();
        assert_matches!(err, DatamakerError::MalformedDescription { .. });
    }

    #[test]
    fn uuid_identity_is_stable() {
        let ws: WorkspaceUrl = "https://example.org/ws/1".parse().unwrap();
        let commit: CommitId = "abc123".parse().unwrap();
        let first = DatasetIdentity::resolve(None, IdType::Uuid, &ws, &commit, b"{}");
        let second = DatasetIdentity::resolve(None, IdType::Uuid, &ws, &commit, b"{}");
        assert_eq!(first, second);
        assert_eq!(first.id.len(), 36);
    }
}
