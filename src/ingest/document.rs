//! Collector document loading
//!
//! A collector file is a JSON object with a `meta.type` tag naming the
//! entity type of every record and a `data` array of records. Relation
//! lists that are absent or `null` are read as empty.

use crate::error::{IngestError, IngestResult};
use crate::graph::{Label, PropertyMap, PropertyValue};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::path::{Path, PathBuf};

/// Entity type shared by every record of a document
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityType {
    User,
    Group,
    Computer,
    Container,
    OU,
    GPO,
    Domain,
    /// Any other collector category, label derived by the same rule
    Other(String),
}

impl EntityType {
    /// Types that get a uniqueness constraint and a name index
    pub fn concrete() -> [EntityType; 7] {
        [
            EntityType::User,
            EntityType::Computer,
            EntityType::Group,
            EntityType::GPO,
            EntityType::Container,
            EntityType::OU,
            EntityType::Domain,
        ]
    }

    /// Map a collector tag to its type
    ///
    /// Plural tags are singularized and capitalized (`users` -> `User`);
    /// `ous` and `gpos` become `OU` and `GPO`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.trim();
        let singular = tag.strip_suffix('s').filter(|s| !s.is_empty())?;
        let entity = match singular.to_ascii_lowercase().as_str() {
            "user" => EntityType::User,
            "group" => EntityType::Group,
            "computer" => EntityType::Computer,
            "container" => EntityType::Container,
            "ou" => EntityType::OU,
            "gpo" => EntityType::GPO,
            "domain" => EntityType::Domain,
            _ => {
                let mut chars = singular.chars();
                let first = chars.next()?;
                EntityType::Other(first.to_uppercase().chain(chars).collect())
            }
        };
        Some(entity)
    }

    pub fn as_str(&self) -> &str {
        match self {
            EntityType::User => "User",
            EntityType::Group => "Group",
            EntityType::Computer => "Computer",
            EntityType::Container => "Container",
            EntityType::OU => "OU",
            EntityType::GPO => "GPO",
            EntityType::Domain => "Domain",
            EntityType::Other(name) => name,
        }
    }

    pub fn label(&self) -> Label {
        Label::new(self.as_str())
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Treat an explicit `null` like a missing field
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// One access-control entry granting `right_name` to a principal
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Ace {
    #[serde(rename = "PrincipalSID", default)]
    pub principal_sid: Option<String>,
    #[serde(rename = "RightName")]
    pub right_name: String,
    #[serde(rename = "IsInherited", default, deserialize_with = "nullable")]
    pub is_inherited: bool,
}

/// Reference to another directory object
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ObjectRef {
    #[serde(rename = "ObjectIdentifier")]
    pub object_id: String,
    #[serde(rename = "ObjectType", default)]
    pub object_type: Option<String>,
}

/// GPO linked to a container or OU
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GpoLink {
    #[serde(rename = "GUID")]
    pub guid: String,
    #[serde(rename = "IsEnforced", default, deserialize_with = "nullable")]
    pub enforced: bool,
}

/// Direction of a domain trust, seen from the declaring domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustDirection {
    Disabled,
    Inbound,
    Outbound,
    Bidirectional,
    /// Unrecognised code or name, kept verbatim; yields no edge
    Unknown(String),
}

impl<'de> Deserialize<'de> for TrustDirection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Code(i64),
            Name(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Code(0) => Ok(TrustDirection::Disabled),
            Raw::Code(1) => Ok(TrustDirection::Inbound),
            Raw::Code(2) => Ok(TrustDirection::Outbound),
            Raw::Code(3) => Ok(TrustDirection::Bidirectional),
            Raw::Name(name) => match name.as_str() {
                "Disabled" => Ok(TrustDirection::Disabled),
                "Inbound" => Ok(TrustDirection::Inbound),
                "Outbound" => Ok(TrustDirection::Outbound),
                "Bidirectional" => Ok(TrustDirection::Bidirectional),
                _ => Ok(TrustDirection::Unknown(name)),
            },
            Raw::Code(code) => Ok(TrustDirection::Unknown(code.to_string())),
        }
    }
}

/// A trust declared by a domain record
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Trust {
    #[serde(rename = "TargetDomainSid")]
    pub target_domain_sid: String,
    #[serde(rename = "TrustDirection")]
    pub direction: TrustDirection,
    #[serde(rename = "TargetDomainName", default)]
    pub target_domain_name: Option<String>,
}

/// Delegation target, given either as a bare id or as an object reference
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum DelegationTarget {
    Id(String),
    Object(ObjectRef),
}

impl DelegationTarget {
    pub fn object_id(&self) -> &str {
        match self {
            DelegationTarget::Id(id) => id,
            DelegationTarget::Object(obj) => &obj.object_id,
        }
    }
}

/// Logged-on user reported by session collection
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionEntry {
    #[serde(rename = "UserSID")]
    pub user_sid: String,
}

/// A remotely collected list (`{"Collected": .., "Results": [..]}`)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct CollectedResults<T> {
    #[serde(rename = "Results", default = "Vec::new", deserialize_with = "nullable")]
    pub results: Vec<T>,
}

impl<T> Default for CollectedResults<T> {
    fn default() -> Self {
        Self { results: Vec::new() }
    }
}

/// One directory object and its outbound relation lists
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EntityRecord {
    #[serde(rename = "ObjectIdentifier")]
    pub object_id: String,
    #[serde(rename = "Properties", default, deserialize_with = "nullable")]
    pub properties: serde_json::Map<String, serde_json::Value>,
    #[serde(rename = "Aces", default, deserialize_with = "nullable")]
    pub aces: Vec<Ace>,
    #[serde(rename = "Members", default, deserialize_with = "nullable")]
    pub members: Vec<ObjectRef>,
    #[serde(rename = "PrimaryGroupSID", default)]
    pub primary_group_sid: Option<String>,
    #[serde(rename = "ChildObjects", default, deserialize_with = "nullable")]
    pub child_objects: Vec<ObjectRef>,
    #[serde(rename = "Links", default, deserialize_with = "nullable")]
    pub links: Vec<GpoLink>,
    #[serde(rename = "Trusts", default, deserialize_with = "nullable")]
    pub trusts: Vec<Trust>,
    #[serde(rename = "AllowedToDelegate", default, deserialize_with = "nullable")]
    pub allowed_to_delegate: Vec<DelegationTarget>,
    #[serde(rename = "AllowedToAct", default, deserialize_with = "nullable")]
    pub allowed_to_act: Vec<DelegationTarget>,
    #[serde(rename = "RegistrySessions", default, deserialize_with = "nullable")]
    pub registry_sessions: CollectedResults<SessionEntry>,
    #[serde(rename = "RemoteDesktopUsers", default, deserialize_with = "nullable")]
    pub remote_desktop_users: CollectedResults<ObjectRef>,
    #[serde(rename = "LocalAdmins", default, deserialize_with = "nullable")]
    pub local_admins: CollectedResults<ObjectRef>,
    #[serde(rename = "DcomUsers", default, deserialize_with = "nullable")]
    pub dcom_users: CollectedResults<ObjectRef>,
    #[serde(rename = "PSRemoteUsers", default, deserialize_with = "nullable")]
    pub ps_remote_users: CollectedResults<ObjectRef>,
}

impl EntityRecord {
    /// Record with only a key, used when building documents by hand
    pub fn new(object_id: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            properties: serde_json::Map::new(),
            aces: Vec::new(),
            members: Vec::new(),
            primary_group_sid: None,
            child_objects: Vec::new(),
            links: Vec::new(),
            trusts: Vec::new(),
            allowed_to_delegate: Vec::new(),
            allowed_to_act: Vec::new(),
            registry_sessions: CollectedResults::default(),
            remote_desktop_users: CollectedResults::default(),
            local_admins: CollectedResults::default(),
            dcom_users: CollectedResults::default(),
            ps_remote_users: CollectedResults::default(),
        }
    }

    /// Properties converted for the graph store
    pub fn property_map(&self) -> PropertyMap {
        self.properties
            .iter()
            .map(|(key, value)| (key.clone(), PropertyValue::from_json(value)))
            .collect()
    }
}

/// A parsed collector file
#[derive(Debug, Clone, PartialEq)]
pub struct CollectorDocument {
    pub path: PathBuf,
    /// `meta.type` as found in the file
    pub type_tag: String,
    pub entity_type: EntityType,
    pub records: Vec<EntityRecord>,
}

impl CollectorDocument {
    /// File name used in progress lines
    pub fn file_name(&self) -> String {
        display_name(&self.path)
    }
}

pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[derive(Deserialize)]
struct RawMeta {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct RawDocument {
    meta: RawMeta,
    data: Vec<EntityRecord>,
}

/// Read and parse a collector file
pub async fn load_document(path: &Path) -> IngestResult<CollectorDocument> {
    let bytes = tokio::fs::read(path).await.map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_document(path, &bytes)
}

/// Parse collector bytes; `path` is only used for reporting
pub fn parse_document(path: &Path, bytes: &[u8]) -> IngestResult<CollectorDocument> {
    let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let raw: RawDocument = serde_json::from_slice(body).map_err(|source| IngestError::Parse {
        path: path.to_path_buf(),
        reason: format!("not a collector document ({})", source),
        source: Some(source),
    })?;

    let entity_type = EntityType::from_tag(&raw.meta.kind).ok_or_else(|| {
        IngestError::parse(path, format!("unrecognised meta.type '{}'", raw.meta.kind))
    })?;

    Ok(CollectorDocument {
        path: path.to_path_buf(),
        type_tag: raw.meta.kind,
        entity_type,
        records: raw.data,
    })
}
