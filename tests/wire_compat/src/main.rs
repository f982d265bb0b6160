fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use transferit_protocol::constants::{
        WS_ERR_CODE_CHUNK_NOT_AVAILABLE, WS_ERR_CODE_SLOT_EMPTY, WS_ERR_CODE_SLOT_OCCUPIED,
        is_retryable_code,
    };
    use transferit_protocol::messages::{
        ConfirmChunkDownloadedRequest, CurrentSegmentNumberResponse, DownloadChunkRequest,
        DownloadChunkResponse, InitUploadResponse, TransferStatusResponse, UploadChunkRequest,
        UploadChunkResponse,
    };
    use transferit_protocol::{Message, MessageType};

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn read_fixture(name: &str) -> String {
        let path = fixtures_dir().join(name);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    /// Parses a fixture into `T`, re-serializes it, and compares the JSON
    /// values (key order independent).
    ///
    /// Parsing goes through the text, not a `Value`, so envelopes keep
    /// their raw payloads.
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let text = read_fixture(name);
        let fixture: serde_json::Value = serde_json::from_str(&text)
            .unwrap_or_else(|e| panic!("failed to parse fixture {name}: {e}"));
        let parsed: T = serde_json::from_str(&text)
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));

        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  fixture: {fixture}\n  rust:    {reserialized}"
        );
        parsed
    }

    // --- Envelopes ---

    #[test]
    fn fixture_message_envelope() {
        let msg = roundtrip_test::<Message>("message_envelope.json");
        assert_eq!(msg.msg_type, MessageType::UploadChunk);
        assert!(msg.error.is_none());

        let req: UploadChunkRequest = msg.parse_payload().unwrap().unwrap();
        assert_eq!(req.chunk_number, 0);
        assert_eq!(req.data, b"hello");
        assert!(!req.is_last);
    }

    #[test]
    fn fixture_error_envelope() {
        let msg = roundtrip_test::<Message>("error_envelope.json");
        assert_eq!(msg.msg_type, MessageType::Error);
        assert!(msg.payload.is_none());

        let err = msg.error.unwrap();
        assert_eq!(err.code, WS_ERR_CODE_SLOT_OCCUPIED);
        assert!(is_retryable_code(err.code));
    }

    #[test]
    fn fixture_init_upload_request() {
        let msg = roundtrip_test::<Message>("init_upload_request.json");
        assert_eq!(msg.msg_type, MessageType::InitUpload);
        assert!(msg.payload.is_none());
    }

    #[test]
    fn unknown_message_type_is_tolerated() {
        let msg: Message =
            serde_json::from_str(r#"{"id":"x","type":"resume_upload","payload":{}}"#).unwrap();
        assert_eq!(msg.msg_type, MessageType::Unknown);
    }

    #[test]
    fn message_type_wire_names() {
        let cases = [
            (MessageType::Ping, "ping"),
            (MessageType::InitUpload, "init_upload"),
            (MessageType::UploadChunk, "upload_chunk"),
            (MessageType::DownloadChunk, "download_chunk"),
            (MessageType::ConfirmChunkDownloaded, "confirm_chunk_downloaded"),
            (MessageType::GetCurrentSegmentNumber, "get_current_segment_number"),
            (MessageType::GetTransferStatus, "get_transfer_status"),
            (MessageType::Pong, "pong"),
            (MessageType::InitUploadResponse, "init_upload_response"),
            (MessageType::UploadChunkResponse, "upload_chunk_response"),
            (MessageType::DownloadChunkResponse, "download_chunk_response"),
            (
                MessageType::ConfirmChunkDownloadedResponse,
                "confirm_chunk_downloaded_response",
            ),
            (
                MessageType::CurrentSegmentNumberResponse,
                "current_segment_number_response",
            ),
            (MessageType::TransferStatusResponse, "transfer_status_response"),
            (MessageType::Error, "error"),
        ];
        for (ty, name) in cases {
            assert_eq!(serde_json::to_value(&ty).unwrap(), name);
            let back: MessageType = serde_json::from_value(name.into()).unwrap();
            assert_eq!(back, ty);
        }
    }

    // --- Payloads ---

    #[test]
    fn fixture_init_upload_response() {
        roundtrip_test::<InitUploadResponse>("init_upload_response.json");
    }

    #[test]
    fn fixture_upload_chunk_request() {
        let req = roundtrip_test::<UploadChunkRequest>("upload_chunk_request.json");
        assert_eq!(req.data, b"world");
        assert!(req.is_last);
    }

    #[test]
    fn fixture_upload_chunk_response() {
        roundtrip_test::<UploadChunkResponse>("upload_chunk_response.json");
    }

    #[test]
    fn fixture_download_chunk_request() {
        roundtrip_test::<DownloadChunkRequest>("download_chunk_request.json");
    }

    #[test]
    fn fixture_download_chunk_response() {
        let resp = roundtrip_test::<DownloadChunkResponse>("download_chunk_response.json");
        assert_eq!(resp.data, [0x00, 0x01, 0x02, 0xfd, 0xfe, 0xff]);
        assert!(!resp.is_last);
    }

    #[test]
    fn fixture_confirm_chunk_downloaded_request() {
        roundtrip_test::<ConfirmChunkDownloadedRequest>("confirm_chunk_downloaded_request.json");
    }

    #[test]
    fn fixture_current_segment_number_response() {
        let resp =
            roundtrip_test::<CurrentSegmentNumberResponse>("current_segment_number_response.json");
        assert_eq!(resp.chunk_number, 4);
    }

    #[test]
    fn fixture_transfer_status_response() {
        let resp = roundtrip_test::<TransferStatusResponse>("transfer_status_response.json");
        assert_eq!(resp.pending_chunk_number, Some(5));
        assert_eq!(resp.last_consumed_number, Some(4));
    }

    #[test]
    fn fixture_transfer_status_response_fresh() {
        let resp = roundtrip_test::<TransferStatusResponse>("transfer_status_response_fresh.json");
        assert_eq!(resp.pending_chunk_number, None);
        assert_eq!(resp.last_consumed_number, None);
        assert_eq!(resp.uploaded_chunks, 0);
    }

    #[test]
    fn retryable_codes_match_transient_rejections() {
        for code in [
            WS_ERR_CODE_SLOT_OCCUPIED,
            WS_ERR_CODE_SLOT_EMPTY,
            WS_ERR_CODE_CHUNK_NOT_AVAILABLE,
        ] {
            assert!(is_retryable_code(code), "{code}");
        }
        for code in [400, 404, 412, 413, 422, 500, 501] {
            assert!(!is_retryable_code(code), "{code}");
        }
    }
}
