use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

// `init_upload` carries no payload.

/// Offers the next chunk of a transfer.
///
/// The `data` field is base64-encoded in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadChunkRequest {
    pub transfer_id: String,
    pub chunk_number: i64,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_last: bool,
}

/// Fetches the pending chunk of a transfer without consuming it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadChunkRequest {
    pub transfer_id: String,
    pub chunk_number: i64,
}

/// Acknowledges that a downloaded chunk has been fully consumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmChunkDownloadedRequest {
    pub transfer_id: String,
    pub chunk_number: i64,
}

/// Asks which chunk number is currently pending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetCurrentSegmentNumberRequest {
    pub transfer_id: String,
}

/// Asks for the diagnostic state of a transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTransferStatusRequest {
    pub transfer_id: String,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Handle of a freshly started transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitUploadResponse {
    pub transfer_id: String,
}

/// Upload accepted into the slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadChunkResponse {
    pub chunk_number: i64,
}

/// The pending chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadChunkResponse {
    pub transfer_id: String,
    pub chunk_number: i64,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_last: bool,
}

/// Confirmation accepted (always sent, even for duplicates).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmChunkDownloadedResponse {
    pub chunk_number: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentSegmentNumberResponse {
    pub chunk_number: i64,
}

/// Diagnostic view of a transfer.
///
/// Absent chunk numbers mean "nothing pending" / "nothing confirmed yet".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferStatusResponse {
    pub transfer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_chunk_number: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_consumed_number: Option<i64>,
    pub uploaded_chunks: u64,
    pub uploaded_bytes: u64,
}

fn is_false(v: &bool) -> bool {
    !v
}

/// Serde adapter encoding byte payloads as standard base64 strings.
mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(data).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_chunk_base64_encoding() {
        let req = UploadChunkRequest {
            transfer_id: "t1".into(),
            chunk_number: 0,
            data: b"hello".to_vec(),
            is_last: false,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"aGVsbG8=\""));
        assert!(json.contains("\"transferId\":\"t1\""));
        assert!(json.contains("\"chunkNumber\":0"));
        let parsed: UploadChunkRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.data, b"hello");
    }

    #[test]
    fn upload_chunk_omits_is_last_when_false() {
        let req = UploadChunkRequest {
            transfer_id: "t1".into(),
            chunk_number: 3,
            data: vec![],
            is_last: false,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("isLast"));

        let last = UploadChunkRequest { is_last: true, ..req };
        let json = serde_json::to_string(&last).unwrap();
        assert!(json.contains("\"isLast\":true"));
    }

    #[test]
    fn download_chunk_response_defaults_is_last() {
        let json = r#"{"transferId":"t1","chunkNumber":2,"data":"d29ybGQ="}"#;
        let resp: DownloadChunkResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.chunk_number, 2);
        assert_eq!(resp.data, b"world");
        assert!(!resp.is_last);
    }

    #[test]
    fn invalid_base64_rejected() {
        let json = r#"{"transferId":"t1","chunkNumber":0,"data":"@@not base64@@"}"#;
        let result: Result<UploadChunkRequest, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn transfer_status_omits_absent_numbers() {
        let resp = TransferStatusResponse {
            transfer_id: "t1".into(),
            pending_chunk_number: None,
            last_consumed_number: Some(4),
            uploaded_chunks: 5,
            uploaded_bytes: 5000,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(!json.contains("pendingChunkNumber"));
        assert!(json.contains("\"lastConsumedNumber\":4"));
    }
}
