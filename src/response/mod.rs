pub mod xml;

pub use xml::{
    parse_multistatus, parse_ocs_envelope, xml_to_value, DavEntry, EntryKind, OcsEnvelope, OcsMeta,
};

use serde_json::{json, Value};

use crate::config::NextcloudConfig;
use crate::errors::AdapterError;
use crate::models::{
    BinaryAttachment, FileOperation, FolderOperation, Operation, OutputRecord, RawResponse, Record,
    UserOperation,
};
use crate::params::{ParameterSource, Params};

/// What a normalized response contributes to the batch output.
#[derive(Debug)]
pub enum Normalized {
    /// Fresh output records appended to the result list.
    Records(Vec<OutputRecord>),
    /// Download only: the originating record with the binary merged in,
    /// replacing it in place.
    Merged(Record),
}

/// Converts the raw response of one request into output records.
///
/// Downloads attach the binary to the input record; OCS operations unwrap
/// the envelope; folder listings explode into one record per child entry;
/// everything else passes the body through as a single record.
pub fn normalize(
    op: &Operation,
    item: usize,
    raw: RawResponse,
    input: &Record,
    source: &dyn ParameterSource,
    config: &NextcloudConfig,
) -> Result<Normalized, AdapterError> {
    match op {
        Operation::File(FileOperation::Download) => {
            let RawResponse::Binary(bytes) = raw else {
                return Err(AdapterError::Parse(
                    "expected a binary response body for the download".to_string(),
                ));
            };
            let p = Params::new(source, item);
            let field = p.str_or("binaryPropertyName", "data");
            let path = p.required_str("path")?;

            // Shallow-copy the existing attachments forward so shared input
            // state is never mutated.
            let mut record = Record {
                json: input.json.clone(),
                binary: input.binary.clone(),
            };
            record
                .binary
                .insert(field, BinaryAttachment::from_bytes(bytes, &path));
            Ok(Normalized::Merged(record))
        }
        Operation::File(FileOperation::Share) | Operation::Folder(FolderOperation::Share) => {
            let envelope = parse_ocs_envelope(&text_body(raw)?)?;
            Ok(Normalized::Records(vec![OutputRecord::json_only(
                envelope.data,
                item,
            )]))
        }
        Operation::User(user_op) => normalize_user(*user_op, item, &text_body(raw)?),
        Operation::Folder(FolderOperation::List) => {
            let entries = parse_multistatus(&text_body(raw)?, &config.webdav_mount_path())?;
            let records = entries
                .into_iter()
                .map(|entry| {
                    serde_json::to_value(entry)
                        .map(|json| OutputRecord::json_only(json, item))
                        .map_err(|e| AdapterError::Parse(e.to_string()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Normalized::Records(records))
        }
        // Plain WebDAV operations: the body is passed through, parsed as
        // JSON when it happens to be JSON.
        _ => {
            let body = text_body(raw)?;
            let json = serde_json::from_str(&body).unwrap_or(Value::String(body));
            Ok(Normalized::Records(vec![OutputRecord::json_only(
                json, item,
            )]))
        }
    }
}

fn normalize_user(
    op: UserOperation,
    item: usize,
    body: &str,
) -> Result<Normalized, AdapterError> {
    let envelope = parse_ocs_envelope(body)?;

    match op {
        UserOperation::GetAll => {
            // One user comes back as a lone string, several as a list;
            // callers always see one record per username.
            let usernames: Vec<String> = match envelope.data.get("users").and_then(|u| u.get("element"))
            {
                Some(Value::String(name)) => vec![name.clone()],
                Some(Value::Array(names)) => names
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
                _ => Vec::new(),
            };
            Ok(Normalized::Records(
                usernames
                    .into_iter()
                    .map(|name| OutputRecord::json_only(json!({ "id": name }), item))
                    .collect(),
            ))
        }
        // Delete and update return no data payload; the success
        // confirmation doubles as the result.
        UserOperation::Delete | UserOperation::Update => {
            let meta = serde_json::to_value(&envelope.meta)
                .map_err(|e| AdapterError::Parse(e.to_string()))?;
            Ok(Normalized::Records(vec![OutputRecord::json_only(
                meta, item,
            )]))
        }
        UserOperation::Create | UserOperation::Get => Ok(Normalized::Records(vec![
            OutputRecord::json_only(envelope.data, item),
        ])),
    }
}

fn text_body(raw: RawResponse) -> Result<String, AdapterError> {
    match raw {
        RawResponse::Text(body) => Ok(body),
        RawResponse::Binary(_) => Err(AdapterError::Parse(
            "expected a text response body".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ItemParameters;

    fn config() -> NextcloudConfig {
        NextcloudConfig::new(
            "https://cloud.example.com/remote.php/webdav",
            "alice",
            "secret",
        )
    }

    fn run(
        op: Operation,
        raw: RawResponse,
        params: Value,
        input: &Record,
    ) -> Result<Normalized, AdapterError> {
        let source = ItemParameters::shared(params);
        normalize(&op, 0, raw, input, &source, &config())
    }

    fn records(normalized: Normalized) -> Vec<OutputRecord> {
        match normalized {
            Normalized::Records(records) => records,
            other => panic!("expected records, got {:?}", other),
        }
    }

    #[test]
    fn download_attaches_binary_without_touching_existing_attachments() {
        let mut input = Record {
            json: json!({"kept": true}),
            ..Record::default()
        };
        input.binary.insert(
            "previous".to_string(),
            BinaryAttachment::from_bytes(vec![1], "/old.bin"),
        );

        let normalized = run(
            Operation::File(FileOperation::Download),
            RawResponse::Binary(vec![9, 9, 9]),
            json!({"path": "/invoices/report.pdf", "binaryPropertyName": "data"}),
            &input,
        )
        .unwrap();

        let Normalized::Merged(record) = normalized else {
            panic!("download must merge into the input record");
        };
        assert_eq!(record.json, json!({"kept": true}));
        assert_eq!(record.binary.len(), 2);
        let attached = &record.binary["data"];
        assert_eq!(attached.data, vec![9, 9, 9]);
        assert_eq!(attached.file_name, "report.pdf");
        assert_eq!(attached.mime_type, "application/pdf");
        // the input record itself is untouched
        assert_eq!(input.binary.len(), 1);
    }

    #[test]
    fn share_emits_the_data_payload() {
        let xml = r#"<ocs>
            <meta><status>ok</status><statuscode>200</statuscode></meta>
            <data><id>42</id><url>https://cloud.example.com/s/abc</url></data>
        </ocs>"#;
        let out = records(
            run(
                Operation::File(FileOperation::Share),
                RawResponse::Text(xml.to_string()),
                json!({}),
                &Record::default(),
            )
            .unwrap(),
        );
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].json,
            json!({"id": "42", "url": "https://cloud.example.com/s/abc"})
        );
        assert_eq!(out[0].paired_item, 0);
    }

    #[test]
    fn user_get_emits_data_and_delete_emits_meta() {
        let get_xml = r#"<ocs>
            <meta><status>ok</status></meta>
            <data><id>alice</id><enabled>1</enabled></data>
        </ocs>"#;
        let out = records(
            run(
                Operation::User(UserOperation::Get),
                RawResponse::Text(get_xml.to_string()),
                json!({}),
                &Record::default(),
            )
            .unwrap(),
        );
        assert_eq!(out[0].json, json!({"id": "alice", "enabled": "1"}));

        let delete_xml = r#"<ocs>
            <meta><status>ok</status><statuscode>100</statuscode><message>OK</message></meta>
            <data/>
        </ocs>"#;
        let out = records(
            run(
                Operation::User(UserOperation::Delete),
                RawResponse::Text(delete_xml.to_string()),
                json!({}),
                &Record::default(),
            )
            .unwrap(),
        );
        assert_eq!(
            out[0].json,
            json!({"status": "ok", "statuscode": "100", "message": "OK"})
        );
    }

    #[test]
    fn get_all_single_and_multiple_users_have_the_same_shape() {
        let single = r#"<ocs><meta><status>ok</status></meta>
            <data><users><element>alice</element></users></data></ocs>"#;
        let out = records(
            run(
                Operation::User(UserOperation::GetAll),
                RawResponse::Text(single.to_string()),
                json!({}),
                &Record::default(),
            )
            .unwrap(),
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].json, json!({"id": "alice"}));

        let multiple = r#"<ocs><meta><status>ok</status></meta>
            <data><users><element>alice</element><element>bob</element></users></data></ocs>"#;
        let out = records(
            run(
                Operation::User(UserOperation::GetAll),
                RawResponse::Text(multiple.to_string()),
                json!({}),
                &Record::default(),
            )
            .unwrap(),
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].json, json!({"id": "bob"}));
    }

    #[test]
    fn remote_failure_propagates_as_error() {
        let xml = r#"<ocs><meta><status>failure</status><message>not found</message></meta></ocs>"#;
        let err = run(
            Operation::User(UserOperation::Get),
            RawResponse::Text(xml.to_string()),
            json!({}),
            &Record::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn fallback_parses_json_bodies_and_passes_text_through() {
        let out = records(
            run(
                Operation::Folder(FolderOperation::Create),
                RawResponse::Text(r#"{"ok":true}"#.to_string()),
                json!({}),
                &Record::default(),
            )
            .unwrap(),
        );
        assert_eq!(out[0].json, json!({"ok": true}));

        let out = records(
            run(
                Operation::File(FileOperation::Delete),
                RawResponse::Text(String::new()),
                json!({}),
                &Record::default(),
            )
            .unwrap(),
        );
        assert_eq!(out[0].json, json!(""));
    }
}
