use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::AdapterError;

/// The Nextcloud resource an operation acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    File,
    Folder,
    User,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::File => write!(f, "file"),
            Resource::Folder => write!(f, "folder"),
            Resource::User => write!(f, "user"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOperation {
    Copy,
    Delete,
    Download,
    Move,
    Share,
    Upload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderOperation {
    Copy,
    Create,
    Delete,
    List,
    Move,
    Share,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserOperation {
    Create,
    Delete,
    Get,
    GetAll,
    Update,
}

/// A fully resolved (resource, operation) selection. Every supported
/// combination is a distinct variant, so the request builder and response
/// normalizer can dispatch on it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    File(FileOperation),
    Folder(FolderOperation),
    User(UserOperation),
}

impl Operation {
    pub fn resource(&self) -> Resource {
        match self {
            Operation::File(_) => Resource::File,
            Operation::Folder(_) => Resource::Folder,
            Operation::User(_) => Resource::User,
        }
    }

    /// Resolves resource and operation names as they appear in job files.
    /// Unknown combinations are a configuration error and fail before any
    /// request is issued.
    pub fn parse(resource: &str, operation: &str) -> Result<Self, AdapterError> {
        let parsed = match resource {
            "file" => match operation {
                "copy" => Some(Operation::File(FileOperation::Copy)),
                "delete" => Some(Operation::File(FileOperation::Delete)),
                "download" => Some(Operation::File(FileOperation::Download)),
                "move" => Some(Operation::File(FileOperation::Move)),
                "share" => Some(Operation::File(FileOperation::Share)),
                "upload" => Some(Operation::File(FileOperation::Upload)),
                _ => None,
            },
            "folder" => match operation {
                "copy" => Some(Operation::Folder(FolderOperation::Copy)),
                "create" => Some(Operation::Folder(FolderOperation::Create)),
                "delete" => Some(Operation::Folder(FolderOperation::Delete)),
                "list" => Some(Operation::Folder(FolderOperation::List)),
                "move" => Some(Operation::Folder(FolderOperation::Move)),
                "share" => Some(Operation::Folder(FolderOperation::Share)),
                _ => None,
            },
            "user" => match operation {
                "create" => Some(Operation::User(UserOperation::Create)),
                "delete" => Some(Operation::User(UserOperation::Delete)),
                "get" => Some(Operation::User(UserOperation::Get)),
                "getAll" => Some(Operation::User(UserOperation::GetAll)),
                "update" => Some(Operation::User(UserOperation::Update)),
                _ => None,
            },
            other => {
                return Err(AdapterError::Config(format!(
                    "the resource \"{}\" is not known",
                    other
                )))
            }
        };

        parsed.ok_or_else(|| {
            AdapterError::Config(format!(
                "the operation \"{}\" is not supported for resource \"{}\"",
                operation, resource
            ))
        })
    }

    fn operation_name(&self) -> &'static str {
        match self {
            Operation::File(FileOperation::Copy) | Operation::Folder(FolderOperation::Copy) => {
                "copy"
            }
            Operation::File(FileOperation::Delete)
            | Operation::Folder(FolderOperation::Delete)
            | Operation::User(UserOperation::Delete) => "delete",
            Operation::File(FileOperation::Download) => "download",
            Operation::File(FileOperation::Move) | Operation::Folder(FolderOperation::Move) => {
                "move"
            }
            Operation::File(FileOperation::Share) | Operation::Folder(FolderOperation::Share) => {
                "share"
            }
            Operation::File(FileOperation::Upload) => "upload",
            Operation::Folder(FolderOperation::Create) | Operation::User(UserOperation::Create) => {
                "create"
            }
            Operation::Folder(FolderOperation::List) => "list",
            Operation::User(UserOperation::Get) => "get",
            Operation::User(UserOperation::GetAll) => "getAll",
            Operation::User(UserOperation::Update) => "update",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource(), self.operation_name())
    }
}

impl<'de> Deserialize<'de> for Operation {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Selection {
            resource: String,
            operation: String,
        }

        let raw = Selection::deserialize(deserializer)?;
        Operation::parse(&raw.resource, &raw.operation).map_err(serde::de::Error::custom)
    }
}

/// Share target types, numeric values as the OCS sharing API defines them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ShareType {
    User = 0,
    Group = 1,
    PublicLink = 3,
    Email = 4,
    Circle = 7,
}

impl ShareType {
    pub fn from_id(id: u64) -> Option<Self> {
        match id {
            0 => Some(ShareType::User),
            1 => Some(ShareType::Group),
            3 => Some(ShareType::PublicLink),
            4 => Some(ShareType::Email),
            7 => Some(ShareType::Circle),
            _ => None,
        }
    }

    pub fn as_id(self) -> u8 {
        self as u8
    }

    /// Name of the parameter holding the share recipient for this type.
    /// Public links have no recipient.
    pub fn share_with_parameter(self) -> Option<&'static str> {
        match self {
            ShareType::User => Some("user"),
            ShareType::Group => Some("groupId"),
            ShareType::PublicLink => None,
            ShareType::Email => Some("email"),
            ShareType::Circle => Some("circleId"),
        }
    }
}

/// Share permission bit flags accepted by the OCS sharing API.
pub mod share_permission {
    pub const READ: u8 = 1;
    pub const UPDATE: u8 = 2;
    pub const CREATE: u8 = 4;
    pub const DELETE: u8 = 8;
    pub const ALL: u8 = 31;
}

/// User attributes editable through the OCS provisioning API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserField {
    Address,
    DisplayName,
    Email,
    Password,
    Twitter,
    Website,
}

impl UserField {
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "address" => Some(UserField::Address),
            "displayname" => Some(UserField::DisplayName),
            "email" => Some(UserField::Email),
            "password" => Some(UserField::Password),
            "twitter" => Some(UserField::Twitter),
            "website" => Some(UserField::Website),
            _ => None,
        }
    }

    pub fn as_key(self) -> &'static str {
        match self {
            UserField::Address => "address",
            UserField::DisplayName => "displayname",
            UserField::Email => "email",
            UserField::Password => "password",
            UserField::Twitter => "twitter",
            UserField::Website => "website",
        }
    }
}

/// One HTTP request ready for the transport: built once per input record,
/// consumed once.
#[derive(Debug, Clone)]
pub struct HttpEnvelope {
    pub method: reqwest::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    /// When set the transport returns the raw bytes instead of decoding
    /// the body as text. Only file downloads use this.
    pub binary_response: bool,
}

impl HttpEnvelope {
    pub fn new(method: reqwest::Method, url: String) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
            binary_response: false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Text(String),
    Binary(Vec<u8>),
}

/// Raw response handed back by the transport.
#[derive(Debug, Clone)]
pub enum RawResponse {
    Text(String),
    Binary(Vec<u8>),
}

/// A binary payload attached to a record, with the metadata downstream
/// steps need to handle it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryAttachment {
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
}

impl BinaryAttachment {
    /// Wraps raw bytes, deriving file name and MIME type from the remote
    /// path the bytes were fetched from.
    pub fn from_bytes(data: Vec<u8>, path: &str) -> Self {
        let file_name = path
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or(path)
            .to_string();
        let mime_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .to_string();

        Self {
            data,
            file_name,
            mime_type,
        }
    }
}

/// One input record of a batch: arbitrary JSON plus named binary
/// attachments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Record {
    #[serde(default)]
    pub json: Value,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub binary: BTreeMap<String, BinaryAttachment>,
}

/// One normalized output record. `paired_item` links back to the input
/// record it originated from; emitted once and never mutated afterward.
#[derive(Debug, Clone, Serialize)]
pub struct OutputRecord {
    pub json: Value,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub binary: BTreeMap<String, BinaryAttachment>,
    pub paired_item: usize,
}

impl OutputRecord {
    pub fn json_only(json: Value, paired_item: usize) -> Self {
        Self {
            json,
            binary: BTreeMap::new(),
            paired_item,
        }
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text.as_bytes()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_resolves_known_combinations() {
        assert_eq!(
            Operation::parse("file", "download").unwrap(),
            Operation::File(FileOperation::Download)
        );
        assert_eq!(
            Operation::parse("folder", "list").unwrap(),
            Operation::Folder(FolderOperation::List)
        );
        assert_eq!(
            Operation::parse("user", "getAll").unwrap(),
            Operation::User(UserOperation::GetAll)
        );
    }

    #[test]
    fn parse_rejects_unknown_resource() {
        let err = Operation::parse("calendar", "list").unwrap_err();
        assert!(err.to_string().contains("calendar"));
    }

    #[test]
    fn parse_rejects_mismatched_operation() {
        assert!(Operation::parse("file", "list").is_err());
        assert!(Operation::parse("folder", "download").is_err());
        assert!(Operation::parse("user", "upload").is_err());
    }

    #[test]
    fn share_type_values_match_ocs_api() {
        assert_eq!(ShareType::User.as_id(), 0);
        assert_eq!(ShareType::Group.as_id(), 1);
        assert_eq!(ShareType::PublicLink.as_id(), 3);
        assert_eq!(ShareType::Email.as_id(), 4);
        assert_eq!(ShareType::Circle.as_id(), 7);
        assert_eq!(ShareType::from_id(2), None);
    }

    #[test]
    fn share_permissions_match_ocs_api() {
        assert_eq!(share_permission::READ, 1);
        assert_eq!(share_permission::UPDATE, 2);
        assert_eq!(share_permission::CREATE, 4);
        assert_eq!(share_permission::DELETE, 8);
        assert_eq!(share_permission::ALL, 31);
    }

    #[test]
    fn attachment_derives_name_and_mime_from_path() {
        let attachment =
            BinaryAttachment::from_bytes(vec![1, 2, 3], "/invoices/2019/invoice_1.pdf");
        assert_eq!(attachment.file_name, "invoice_1.pdf");
        assert_eq!(attachment.mime_type, "application/pdf");
    }

    #[test]
    fn operation_deserializes_from_selection() {
        let op: Operation =
            serde_json::from_str(r#"{"resource":"user","operation":"update"}"#).unwrap();
        assert_eq!(op, Operation::User(UserOperation::Update));
    }
}
