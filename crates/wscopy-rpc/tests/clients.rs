use std::time::Duration;

use anyhow::{Result, anyhow};
use httpmock::prelude::*;
use reqwest::Client;
use serde_json::json;
use wscopy_core::{
    BlobStore, HandleRegistry, ListQuery, NewDataLink, NewHandle, ObjectRef, SampleService,
    SampleVersion, ServiceError, TypeString, Workspace,
};
use wscopy_rpc::{
    HandleClient, RetryPolicy, SampleClient, ShockClient, Transport, WorkspaceClient,
};

const TOKEN: &str = "token-abc";

fn transport() -> Transport {
    Transport::new(
        Client::new(),
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            multiplier: 2,
        },
    )
}

fn info_tuple(object: u64, name: &str, version: u64) -> serde_json::Value {
    json!([
        object,
        name,
        "KBaseGenomes.Genome-14.2",
        "2024-03-01T10:00:00+0000",
        version,
        "someone",
        42,
        "genomes",
        "0a1b2c",
        1024,
        {"copy_source_upa": "7/8/9", "copy_source_url": "https://source.test/services/ws"}
    ])
}

fn workspace(server: &MockServer) -> Result<WorkspaceClient> {
    Ok(WorkspaceClient::new(
        &server.url("/ws"),
        Some(TOKEN.into()),
        transport(),
    )?)
}

#[tokio::test]
async fn list_objects_decodes_info_tuples() -> Result<()> {
    let server = MockServer::start_async().await;
    let mock = server.mock(|when, then| {
        when.method(POST).path("/ws").header("authorization", TOKEN);
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "version": "1.1",
                "result": [[info_tuple(3, "ecoli", 2), info_tuple(4, "bsub", 1)]]
            }));
    });

    let listed = workspace(&server)?
        .list_objects(
            &ListQuery::container(42)
                .of_type("KBaseGenomes.Genome")
                .with_metadata(),
        )
        .await?;
    mock.assert();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].reference, ObjectRef::new(42, 3, 2));
    assert_eq!(listed[1].name, "bsub");
    let marker = listed[0].marker()?.ok_or_else(|| anyhow!("marker"))?;
    assert_eq!(marker.source, ObjectRef::new(7, 8, 9));
    Ok(())
}

#[tokio::test]
async fn get_object_returns_payload_and_extracted_handles() -> Result<()> {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/ws");
        then.status(200).json_body(json!({
            "version": "1.1",
            "result": [{"data": [{
                "data": {"assembly_ref": "42/1/1", "genbank_handle_ref": "KBH_9"},
                "info": info_tuple(3, "ecoli", 2),
                "extracted_ids": {"handle": ["KBH_9"]}
            }]}]
        }));
    });

    let record = workspace(&server)?
        .get_object(&[ObjectRef::new(42, 3, 2)])
        .await?;
    assert_eq!(record.extracted_handles, vec!["KBH_9".to_string()]);
    assert_eq!(record.data["assembly_ref"], json!("42/1/1"));
    Ok(())
}

#[tokio::test]
async fn fingerprint_translation_round_trips_through_maps() -> Result<()> {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/ws");
        then.status(200).json_body(json!({
            "version": "1.1",
            "result": [{"KBaseGenomes.Genome-14.2": "c0ffee"}]
        }));
    });
    let client = workspace(&server)?;
    let fingerprint = client
        .type_fingerprint(&"KBaseGenomes.Genome-14.2".parse::<TypeString>()?)
        .await?;
    assert_eq!(fingerprint, "c0ffee");
    Ok(())
}

#[tokio::test]
async fn rpc_error_member_is_a_rejection() -> Result<()> {
    let server = MockServer::start_async().await;
    let mock = server.mock(|when, then| {
        when.method(POST).path("/ws");
        then.status(500).json_body(json!({
            "version": "1.1",
            "error": {"name": "JSONRPCError", "code": -32500, "message": "Object 3 cannot be accessed"}
        }));
    });

    let result = workspace(&server)?
        .get_object(&[ObjectRef::new(42, 3, 2)])
        .await;
    assert!(matches!(result, Err(ServiceError::Rejected { .. })));
    mock.assert_hits(1);
    Ok(())
}

#[tokio::test]
async fn unavailable_service_is_retried_then_reported() -> Result<()> {
    let server = MockServer::start_async().await;
    let mock = server.mock(|when, then| {
        when.method(POST).path("/ws");
        then.status(503).body("service unavailable");
    });

    let result = workspace(&server)?
        .list_objects(&ListQuery::container(42))
        .await;
    assert!(matches!(
        result,
        Err(ServiceError::Transport {
            status: Some(503),
            retryable: true,
            ..
        })
    ));
    mock.assert_hits(3);
    Ok(())
}

#[tokio::test]
async fn handles_resolve_and_persist() -> Result<()> {
    let server = MockServer::start_async().await;
    let client = HandleClient::new(&server.url("/handle_service"), Some(TOKEN.into()), transport())?;

    let resolve = server.mock(|when, then| {
        when.method(POST)
            .path("/handle_service")
            .body_includes("hids_to_handles");
        then.status(200).json_body(json!({
            "version": "1.1",
            "result": [[{
                "hid": "KBH_9",
                "id": "node-1",
                "file_name": "genome.gbk",
                "type": "shock",
                "url": "https://source.test/services/shock-api",
                "remote_md5": "abc"
            }]]
        }));
    });
    let record = client.resolve("KBH_9").await?;
    resolve.assert();
    assert_eq!(record.blob_id, "node-1");
    assert_eq!(record.md5.as_deref(), Some("abc"));

    let persist = server.mock(|when, then| {
        when.method(POST)
            .path("/handle_service")
            .body_includes("persist_handle")
            .body_includes("\"filename\":\"genome.gbk\"")
            .body_includes("\"type\":\"shock\"");
        then.status(200)
            .json_body(json!({"version": "1.1", "result": ["KBH_77"]}));
    });
    let hid = client
        .persist(NewHandle {
            blob_id: "node-2".into(),
            filename: "genome.gbk".into(),
            url: "https://target.test/services/shock-api".into(),
            md5: Some("abc".into()),
        })
        .await?;
    persist.assert();
    assert_eq!(hid, "KBH_77");
    Ok(())
}

#[tokio::test]
async fn unknown_handle_is_rejected() -> Result<()> {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/handle_service");
        then.status(200)
            .json_body(json!({"version": "1.1", "result": [[]]}));
    });
    let client = HandleClient::new(&server.url("/handle_service"), None, transport())?;
    assert!(matches!(
        client.resolve("KBH_404").await,
        Err(ServiceError::Rejected { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn blob_download_streams_to_disk() -> Result<()> {
    let server = MockServer::start_async().await;
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/shock-api/node/node-1")
            .query_param_exists("download")
            .header("authorization", format!("OAuth {TOKEN}"));
        then.status(200).body(">contig\nACGT\n");
    });

    let shock = ShockClient::new(&server.url("/shock-api"), Some(TOKEN.into()), transport())?;
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("payload");
    let written = shock.download("node-1", &path).await?;
    mock.assert();
    assert_eq!(written, 13);
    assert_eq!(std::fs::read_to_string(&path)?, ">contig\nACGT\n");
    Ok(())
}

#[tokio::test]
async fn blob_metadata_and_upload() -> Result<()> {
    let server = MockServer::start_async().await;
    let shock = ShockClient::new(&server.url("/shock-api"), Some(TOKEN.into()), transport())?;

    let metadata = server.mock(|when, then| {
        when.method(GET).path("/shock-api/node/node-1");
        then.status(200).json_body(json!({
            "status": 200,
            "error": null,
            "data": {"id": "node-1", "file": {"name": "contigs.fa", "size": 5, "checksum": {"md5": "d41d"}}}
        }));
    });
    let node = shock.node("node-1").await?;
    metadata.assert();
    assert_eq!(node.filename, "contigs.fa");
    assert_eq!(node.md5.as_deref(), Some("d41d"));

    let upload = server.mock(|when, then| {
        when.method(POST)
            .path("/shock-api/node")
            .query_param("filename", "contigs.fa")
            .body("ACGT\n");
        then.status(200).json_body(json!({
            "status": 200,
            "error": null,
            "data": {"id": "node-9", "file": {"name": "contigs.fa", "size": 5, "checksum": {"md5": "e5f6"}}}
        }));
    });
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("payload");
    std::fs::write(&path, "ACGT\n")?;
    let created = shock.upload("contigs.fa", &path).await?;
    upload.assert();
    assert_eq!(created.id, "node-9");
    assert_eq!(created.size, 5);
    Ok(())
}

#[tokio::test]
async fn blob_store_errors_are_rejections() -> Result<()> {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(GET).path("/shock-api/node/missing");
        then.status(200)
            .json_body(json!({"status": 404, "error": ["Node not found"], "data": null}));
    });
    let shock = ShockClient::new(&server.url("/shock-api"), None, transport())?;
    assert!(matches!(
        shock.node("missing").await,
        Err(ServiceError::Rejected { ref message, .. }) if message == "Node not found"
    ));
    Ok(())
}

#[tokio::test]
async fn sample_links_are_created_with_forwarded_dataid() -> Result<()> {
    let server = MockServer::start_async().await;
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/sampleservice")
            .body_includes("SampleService.create_data_link")
            .body_includes("\"update\":true");
        then.status(200).json_body(json!({
            "version": "1.1",
            "result": [{"new_link": {
                "linkid": "l-1",
                "upa": "42/3/1",
                "dataid": "column2",
                "id": "sample-9",
                "version": 1,
                "node": "root",
                "created": 1_700_000_000_000_u64
            }}]
        }));
    });

    let samples = SampleClient::new(&server.url("/sampleservice"), Some(TOKEN.into()), transport())?;
    let link = samples
        .create_data_link(NewDataLink {
            upa: ObjectRef::new(42, 3, 1),
            dataid: Some("column2".into()),
            sample: SampleVersion::new("sample-9", 1),
            node: "root".into(),
        })
        .await?;
    mock.assert();
    assert_eq!(link.sample(), SampleVersion::new("sample-9", 1));
    assert_eq!(link.dataid.as_deref(), Some("column2"));
    Ok(())
}

#[tokio::test]
async fn created_sample_reports_id_and_version() -> Result<()> {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/sampleservice");
        then.status(200)
            .json_body(json!({"version": "1.1", "result": [{"id": "sample-9", "version": 1}]}));
    });
    let samples = SampleClient::new(&server.url("/sampleservice"), None, transport())?;
    let record = soil_record();
    let created = samples.create_sample(record).await?;
    assert_eq!(created, SampleVersion::new("sample-9", 1));
    Ok(())
}

fn soil_record() -> wscopy_core::SampleRecord {
    let mut record = wscopy_core::SampleRecord::new();
    record.insert("name".into(), json!("soil"));
    record.insert("node_tree".into(), json!([]));
    record
}
