use reqwest::Method;

use crate::config::NextcloudConfig;
use crate::errors::AdapterError;
use crate::models::{
    FileOperation, FolderOperation, HttpEnvelope, Operation, Record, RequestBody, ShareType,
    UserField, UserOperation,
};
use crate::params::{value_to_string, ParameterSource, Params};

pub const SHARES_ENDPOINT: &str = "ocs/v2.php/apps/files_sharing/api/v1/shares";
pub const USERS_ENDPOINT: &str = "ocs/v1.php/cloud/users";

/// Builds the HTTP request for one input record of the given operation.
///
/// WebDAV operations address the configured WebDAV mount; OCS operations
/// (sharing, user management) address fixed endpoints on the server root.
/// The input record is consulted only for binary uploads, where it acts as
/// the buffer store.
pub fn build_request(
    op: &Operation,
    item: usize,
    source: &dyn ParameterSource,
    record: &Record,
    config: &NextcloudConfig,
) -> Result<HttpEnvelope, AdapterError> {
    let p = Params::new(source, item);

    match op {
        Operation::File(FileOperation::Download) => {
            let mut envelope = webdav_envelope(Method::GET, config, &p.required_str("path")?);
            envelope.binary_response = true;
            Ok(envelope)
        }
        Operation::File(FileOperation::Upload) => {
            let mut envelope = webdav_envelope(Method::PUT, config, &p.required_str("path")?);
            envelope.body = Some(if p.bool_or("binaryDataUpload", false) {
                let field = p.str_or("binaryPropertyName", "data");
                let attachment = record.binary.get(&field).ok_or_else(|| {
                    AdapterError::Config(format!(
                        "item {} has no binary field \"{}\" to upload",
                        item, field
                    ))
                })?;
                RequestBody::Binary(attachment.data.clone())
            } else {
                RequestBody::Text(p.str_or("fileContent", ""))
            });
            Ok(envelope)
        }
        Operation::Folder(FolderOperation::Create) => Ok(webdav_envelope(
            dav_method("MKCOL")?,
            config,
            &p.required_str("path")?,
        )),
        Operation::Folder(FolderOperation::List) => Ok(webdav_envelope(
            dav_method("PROPFIND")?,
            config,
            &p.required_str("path")?,
        )),
        Operation::File(FileOperation::Copy) | Operation::Folder(FolderOperation::Copy) => {
            copy_or_move(dav_method("COPY")?, &p, config)
        }
        Operation::File(FileOperation::Move) | Operation::Folder(FolderOperation::Move) => {
            copy_or_move(dav_method("MOVE")?, &p, config)
        }
        Operation::File(FileOperation::Delete) | Operation::Folder(FolderOperation::Delete) => {
            Ok(webdav_envelope(
                Method::DELETE,
                config,
                &p.required_str("path")?,
            ))
        }
        Operation::File(FileOperation::Share) | Operation::Folder(FolderOperation::Share) => {
            share(&p, config)
        }
        Operation::User(op) => user_request(*op, &p, config),
    }
}

fn user_request(
    op: UserOperation,
    p: &Params<'_>,
    config: &NextcloudConfig,
) -> Result<HttpEnvelope, AdapterError> {
    match op {
        UserOperation::Create => {
            let mut form = vec![
                ("userid".to_string(), p.required_str("userId")?),
                ("email".to_string(), p.required_str("email")?),
            ];
            let additional = p.object("additionalFields");
            if let Some(display_name) = additional.get("displayName").and_then(value_to_string) {
                form.push(("displayName".to_string(), display_name));
            }

            let mut envelope = ocs_envelope(Method::POST, config, USERS_ENDPOINT);
            envelope.body = Some(RequestBody::Text(encode_form(&form)));
            Ok(envelope)
        }
        UserOperation::Delete => Ok(ocs_envelope(
            Method::DELETE,
            config,
            &user_endpoint(&p.required_str("userId")?),
        )),
        UserOperation::Get => Ok(ocs_envelope(
            Method::GET,
            config,
            &user_endpoint(&p.required_str("userId")?),
        )),
        UserOperation::GetAll => {
            let mut envelope = ocs_envelope(Method::GET, config, USERS_ENDPOINT);
            let options = p.object("options");
            if let Some(search) = options.get("search").and_then(value_to_string) {
                envelope.query.push(("search".to_string(), search));
            }
            if let Some(offset) = options.get("offset").and_then(value_to_string) {
                envelope.query.push(("offset".to_string(), offset));
            }
            if !p.bool_or("returnAll", false) {
                let limit = p.opt_u64("limit").unwrap_or(50);
                envelope.query.push(("limit".to_string(), limit.to_string()));
            }
            Ok(envelope)
        }
        UserOperation::Update => {
            let fields = p.object("updateFields");
            let field = fields
                .get("field")
                .and_then(|v| v.as_object())
                .ok_or_else(|| {
                    AdapterError::Config(format!(
                        "parameter \"updateFields.field\" is missing for item {}",
                        p.item()
                    ))
                })?;
            let key = field
                .get("key")
                .and_then(value_to_string)
                .ok_or_else(|| AdapterError::missing_parameter("updateFields.field.key", p.item()))?;
            let value = field.get("value").and_then(value_to_string).ok_or_else(|| {
                AdapterError::missing_parameter("updateFields.field.value", p.item())
            })?;

            let field_key = UserField::from_key(&key).ok_or_else(|| {
                AdapterError::Config(format!("\"{}\" is not an editable user attribute", key))
            })?;

            let mut envelope = ocs_envelope(
                Method::PUT,
                config,
                &user_endpoint(&p.required_str("userId")?),
            );
            envelope.body = Some(RequestBody::Text(encode_form(&[
                ("key".to_string(), field_key.as_key().to_string()),
                ("value".to_string(), value),
            ])));
            Ok(envelope)
        }
    }
}

fn share(p: &Params<'_>, config: &NextcloudConfig) -> Result<HttpEnvelope, AdapterError> {
    let mut form: Vec<(String, String)> = Vec::new();

    let options = p.object("options");
    if let Some(password) = options.get("password").and_then(value_to_string) {
        form.push(("password".to_string(), password));
    }
    if let Some(permissions) = options.get("permissions").and_then(value_to_string) {
        form.push(("permissions".to_string(), permissions));
    }

    form.push(("path".to_string(), p.required_str("path")?));

    let type_id = p.required_u64("shareType")?;
    let share_type = ShareType::from_id(type_id)
        .ok_or_else(|| AdapterError::Config(format!("unknown share type {}", type_id)))?;
    form.push(("shareType".to_string(), share_type.as_id().to_string()));

    if let Some(recipient_param) = share_type.share_with_parameter() {
        form.push(("shareWith".to_string(), p.required_str(recipient_param)?));
    }

    let mut envelope = ocs_envelope(Method::POST, config, SHARES_ENDPOINT);
    envelope.body = Some(RequestBody::Text(encode_form(&form)));
    Ok(envelope)
}

fn copy_or_move(
    method: Method,
    p: &Params<'_>,
    config: &NextcloudConfig,
) -> Result<HttpEnvelope, AdapterError> {
    let to_path = p.required_str("toPath")?;
    let mut envelope = webdav_envelope(method, config, &p.required_str("path")?);
    envelope.headers.push((
        "Destination".to_string(),
        format!(
            "{}/{}",
            config.webdav_base(),
            encode_uri(to_path.trim_start_matches('/'))
        ),
    ));
    Ok(envelope)
}

fn webdav_envelope(method: Method, config: &NextcloudConfig, path: &str) -> HttpEnvelope {
    HttpEnvelope::new(method, config.webdav_url_for(&encode_uri(path)))
}

fn ocs_envelope(method: Method, config: &NextcloudConfig, endpoint: &str) -> HttpEnvelope {
    let mut envelope = HttpEnvelope::new(method, config.ocs_url(endpoint));
    envelope
        .headers
        .push(("OCS-APIRequest".to_string(), "true".to_string()));
    envelope.headers.push((
        "Content-Type".to_string(),
        "application/x-www-form-urlencoded".to_string(),
    ));
    envelope
}

fn user_endpoint(user_id: &str) -> String {
    format!("{}/{}", USERS_ENDPOINT, urlencoding::encode(user_id))
}

// WebDAV methods reqwest has no constant for.
fn dav_method(name: &str) -> Result<Method, AdapterError> {
    Method::from_bytes(name.as_bytes())
        .map_err(|e| AdapterError::Config(format!("invalid HTTP method {}: {}", name, e)))
}

/// Percent-encodes a path per segment, keeping `/` separators intact
/// (encodeURI semantics for paths).
fn encode_uri(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn encode_form(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| format!("{}={}", urlencoding::encode(key), urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BinaryAttachment;
    use crate::params::ItemParameters;
    use serde_json::json;

    fn config() -> NextcloudConfig {
        NextcloudConfig::new(
            "https://cloud.example.com/remote.php/webdav/",
            "alice",
            "secret",
        )
    }

    fn build(op: Operation, params: serde_json::Value) -> HttpEnvelope {
        let source = ItemParameters::shared(params);
        build_request(&op, 0, &source, &Record::default(), &config()).unwrap()
    }

    fn header<'a>(envelope: &'a HttpEnvelope, name: &str) -> Option<&'a str> {
        envelope
            .headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn body_text(envelope: &HttpEnvelope) -> &str {
        match envelope.body.as_ref() {
            Some(RequestBody::Text(s)) => s,
            other => panic!("expected text body, got {:?}", other),
        }
    }

    #[test]
    fn download_is_binary_get_on_webdav_path() {
        let envelope = build(
            Operation::File(FileOperation::Download),
            json!({"path": "/invoices/2019/invoice_1.pdf"}),
        );
        assert_eq!(envelope.method, Method::GET);
        assert_eq!(
            envelope.url,
            "https://cloud.example.com/remote.php/webdav/invoices/2019/invoice_1.pdf"
        );
        assert!(envelope.binary_response);
        assert!(envelope.body.is_none());
    }

    #[test]
    fn upload_text_sends_file_content() {
        let envelope = build(
            Operation::File(FileOperation::Upload),
            json!({"path": "/notes.txt", "fileContent": "hello there"}),
        );
        assert_eq!(envelope.method, Method::PUT);
        assert_eq!(body_text(&envelope), "hello there");
    }

    #[test]
    fn upload_binary_reads_the_named_attachment() {
        let mut record = Record::default();
        record.binary.insert(
            "data".to_string(),
            BinaryAttachment::from_bytes(vec![0xde, 0xad], "/scan.pdf"),
        );
        let source = ItemParameters::shared(json!({
            "path": "/scan.pdf",
            "binaryDataUpload": true,
        }));
        let envelope = build_request(
            &Operation::File(FileOperation::Upload),
            0,
            &source,
            &record,
            &config(),
        )
        .unwrap();
        match envelope.body {
            Some(RequestBody::Binary(bytes)) => assert_eq!(bytes, vec![0xde, 0xad]),
            other => panic!("expected binary body, got {:?}", other),
        }
    }

    #[test]
    fn upload_binary_without_attachment_fails() {
        let source = ItemParameters::shared(json!({
            "path": "/scan.pdf",
            "binaryDataUpload": true,
        }));
        let err = build_request(
            &Operation::File(FileOperation::Upload),
            0,
            &source,
            &Record::default(),
            &config(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("binary field"));
    }

    #[test]
    fn folder_create_uses_mkcol() {
        let envelope = build(
            Operation::Folder(FolderOperation::Create),
            json!({"path": "/invoices/2019"}),
        );
        assert_eq!(envelope.method.as_str(), "MKCOL");
        assert_eq!(
            envelope.url,
            "https://cloud.example.com/remote.php/webdav/invoices/2019"
        );
    }

    #[test]
    fn folder_list_uses_propfind() {
        let envelope = build(
            Operation::Folder(FolderOperation::List),
            json!({"path": "/invoices"}),
        );
        assert_eq!(envelope.method.as_str(), "PROPFIND");
    }

    #[test]
    fn copy_sets_encoded_destination_header() {
        let envelope = build(
            Operation::File(FileOperation::Copy),
            json!({"path": "/invoices/original.txt", "toPath": "/invoices/copy of it.txt"}),
        );
        assert_eq!(envelope.method.as_str(), "COPY");
        assert_eq!(
            header(&envelope, "Destination").unwrap(),
            "https://cloud.example.com/remote.php/webdav/invoices/copy%20of%20it.txt"
        );
    }

    #[test]
    fn move_sets_destination_header() {
        let envelope = build(
            Operation::Folder(FolderOperation::Move),
            json!({"path": "/old", "toPath": "/new"}),
        );
        assert_eq!(envelope.method.as_str(), "MOVE");
        assert_eq!(
            header(&envelope, "Destination").unwrap(),
            "https://cloud.example.com/remote.php/webdav/new"
        );
    }

    #[test]
    fn delete_targets_webdav_path() {
        let envelope = build(
            Operation::File(FileOperation::Delete),
            json!({"path": "/invoices/2019/invoice_1.pdf"}),
        );
        assert_eq!(envelope.method, Method::DELETE);
        assert!(envelope.body.is_none());
    }

    #[test]
    fn share_public_link_with_options() {
        let envelope = build(
            Operation::File(FileOperation::Share),
            json!({
                "path": "/report.pdf",
                "shareType": 3,
                "options": {"password": "s3cret", "permissions": 31},
            }),
        );
        assert_eq!(envelope.method, Method::POST);
        assert_eq!(
            envelope.url,
            "https://cloud.example.com/ocs/v2.php/apps/files_sharing/api/v1/shares"
        );
        assert_eq!(header(&envelope, "OCS-APIRequest").unwrap(), "true");
        assert_eq!(
            header(&envelope, "Content-Type").unwrap(),
            "application/x-www-form-urlencoded"
        );
        assert_eq!(
            body_text(&envelope),
            "password=s3cret&permissions=31&path=%2Freport.pdf&shareType=3"
        );
    }

    #[test]
    fn share_with_user_resolves_recipient() {
        let envelope = build(
            Operation::Folder(FolderOperation::Share),
            json!({"path": "/shared", "shareType": 0, "user": "bob"}),
        );
        assert_eq!(
            body_text(&envelope),
            "path=%2Fshared&shareType=0&shareWith=bob"
        );
    }

    #[test]
    fn share_with_group_requires_group_id() {
        let source = ItemParameters::shared(json!({"path": "/shared", "shareType": 1}));
        let err = build_request(
            &Operation::File(FileOperation::Share),
            0,
            &source,
            &Record::default(),
            &config(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("groupId"));
    }

    #[test]
    fn user_create_with_display_name() {
        let envelope = build(
            Operation::User(UserOperation::Create),
            json!({
                "userId": "john",
                "email": "john@example.com",
                "additionalFields": {"displayName": "John Doe"},
            }),
        );
        assert_eq!(envelope.method, Method::POST);
        assert_eq!(
            envelope.url,
            "https://cloud.example.com/ocs/v1.php/cloud/users"
        );
        assert_eq!(
            body_text(&envelope),
            "userid=john&email=john%40example.com&displayName=John%20Doe"
        );
    }

    #[test]
    fn user_delete_and_get_address_the_user() {
        let envelope = build(
            Operation::User(UserOperation::Delete),
            json!({"userId": "john"}),
        );
        assert_eq!(envelope.method, Method::DELETE);
        assert_eq!(
            envelope.url,
            "https://cloud.example.com/ocs/v1.php/cloud/users/john"
        );

        let envelope = build(Operation::User(UserOperation::Get), json!({"userId": "john"}));
        assert_eq!(envelope.method, Method::GET);
        assert_eq!(
            envelope.url,
            "https://cloud.example.com/ocs/v1.php/cloud/users/john"
        );
    }

    #[test]
    fn user_get_all_applies_limit_unless_return_all() {
        let envelope = build(
            Operation::User(UserOperation::GetAll),
            json!({"returnAll": false, "limit": 25, "options": {"search": "jo", "offset": 5}}),
        );
        assert_eq!(
            envelope.query,
            vec![
                ("search".to_string(), "jo".to_string()),
                ("offset".to_string(), "5".to_string()),
                ("limit".to_string(), "25".to_string()),
            ]
        );

        let envelope = build(
            Operation::User(UserOperation::GetAll),
            json!({"returnAll": true}),
        );
        assert!(envelope.query.is_empty());
    }

    #[test]
    fn user_update_builds_key_value_body() {
        let envelope = build(
            Operation::User(UserOperation::Update),
            json!({
                "userId": "john",
                "updateFields": {"field": {"key": "email", "value": "new@example.com"}},
            }),
        );
        assert_eq!(envelope.method, Method::PUT);
        assert_eq!(body_text(&envelope), "key=email&value=new%40example.com");
    }

    #[test]
    fn user_update_rejects_unknown_field_key() {
        let source = ItemParameters::shared(json!({
            "userId": "john",
            "updateFields": {"field": {"key": "quota", "value": "1GB"}},
        }));
        let err = build_request(
            &Operation::User(UserOperation::Update),
            0,
            &source,
            &Record::default(),
            &config(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("quota"));
    }
}
