use std::io::Write;

use serde_json::json;

use eth_block_ingest::{stream_records, upload_all, BlockStoreHttp, UploadConfig};

#[tokio::test]
async fn uploads_processed_csv_end_to_end() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "Date,Block,Txn,Gas Used").unwrap();
    writeln!(file, "2024-03-01,19341970,150,\"12,500,000\"").unwrap();
    writeln!(file, "2024-03-01,19341971,151,12600000").unwrap();
    writeln!(file, "2024-03-02,19341972,,").unwrap();
    file.flush().unwrap();

    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/tables/eth-blocks/batch-write")
        .with_status(200)
        .with_body(json!({ "unprocessed": [] }).to_string())
        .expect(2)
        .create_async()
        .await;

    let store = BlockStoreHttp::new(&server.url(), "eth-blocks", None);
    let config = UploadConfig {
        batch_size: 2,
        ..UploadConfig::default()
    };

    let records = stream_records(file.path()).unwrap();
    let summary = upload_all(&store, records, &config).await.unwrap();

    assert_eq!(summary.records_uploaded, 3);
    assert_eq!(summary.batches_attempted, 2);
    assert!(summary.failed_records.is_empty());

    mock.assert_async().await;
}

#[tokio::test]
async fn missing_input_file_fails_before_any_store_call() {
    assert!(stream_records("does-not-exist.csv").is_err());
}
