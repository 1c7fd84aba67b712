//! Snapshot persistence tests for the document repository

use std::collections::HashMap;

use deploy_manager::errors::RepositoryError;
use deploy_manager::filesys::file::File;
use deploy_manager::models::deploy::{BuildStep, Deploy, Status, Step};
use deploy_manager::repository::{MemoryRepository, Repository};

use crate::common::envs;

#[tokio::test]
async fn test_snapshot_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data").join("deploys.json");

    let repository = MemoryRepository::open(File::new(&path)).await.unwrap();
    let mut ids = Vec::new();
    for name in ["first", "second", "third"] {
        let deploy = Deploy::new(name, "https://git/example", envs(&[("PORT", "8080")]));
        ids.push(repository.create_deploy(&deploy).await.unwrap());
    }
    repository
        .init_build(&ids[1], "build-abc", "build-abc", "reg/cobold/abc")
        .await
        .unwrap();
    repository
        .set_build_status(&ids[1], Status::Loading)
        .await
        .unwrap();
    repository
        .record_build_step(&ids[1], &BuildStep::failed(Step::Build, "exit 1"))
        .await
        .unwrap();
    drop(repository);

    let reopened = MemoryRepository::open(File::new(&path)).await.unwrap();
    let listed: Vec<String> = reopened
        .list_deploy()
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.id)
        .collect();
    assert_eq!(listed, ids);

    let deploy = reopened.get_deploy(&ids[1]).await.unwrap();
    assert_eq!(deploy.name, "second");
    assert_eq!(deploy.build.image_name, "reg/cobold/abc");
    assert_eq!(deploy.build.status, Some(Status::Loading));
    assert_eq!(deploy.build.steps, vec![BuildStep::failed(Step::Build, "exit 1")]);
    assert_eq!(deploy.workload.envs, envs(&[("PORT", "8080")]));

    // New documents land after the reloaded ones
    let fourth = reopened
        .create_deploy(&Deploy::new("fourth", "https://git/example", HashMap::new()))
        .await
        .unwrap();
    let last = reopened.list_deploy().await.unwrap().pop().unwrap();
    assert_eq!(last.id, fourth);
}

#[tokio::test]
async fn test_snapshot_document_layout() {
    let dir = tempfile::tempdir().unwrap();
    let file = File::new(dir.path().join("deploys.json"));

    let repository = MemoryRepository::open(file.clone()).await.unwrap();
    let id = repository
        .create_deploy(&Deploy::new(
            "demo",
            "https://git/example",
            envs(&[("MODE", "prod"), ("A", "1")]),
        ))
        .await
        .unwrap();
    repository
        .set_build_status(&id, Status::Loading)
        .await
        .unwrap();
    repository
        .record_build_step(&id, &BuildStep::ok(Step::Clone))
        .await
        .unwrap();

    let raw: serde_json::Value = file.read_json().await.unwrap();
    let doc = &raw[0];
    assert_eq!(doc["_id"], id.as_str());
    assert_eq!(doc["name"], "demo");
    assert_eq!(doc["git_repo"], "https://git/example");
    assert_eq!(doc["build"]["status"], 2);
    assert_eq!(doc["build"]["steps"][0]["step"], 1);
    assert_eq!(doc["workload"]["envs"][0]["key"], "A");
    assert_eq!(doc["workload"]["envs"][1]["key"], "MODE");
}

#[tokio::test]
async fn test_delete_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("deploys.json");

    let repository = MemoryRepository::open(File::new(&path)).await.unwrap();
    let kept = repository
        .create_deploy(&Deploy::new("kept", "https://git/a", HashMap::new()))
        .await
        .unwrap();
    let removed = repository
        .create_deploy(&Deploy::new("removed", "https://git/b", HashMap::new()))
        .await
        .unwrap();
    repository.delete_deploy(&removed).await.unwrap();

    let reopened = MemoryRepository::open(File::new(&path)).await.unwrap();
    assert_eq!(reopened.list_deploy().await.unwrap().len(), 1);
    assert!(reopened.get_deploy(&kept).await.is_ok());
    assert!(matches!(
        reopened.get_deploy(&removed).await,
        Err(RepositoryError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_corrupt_snapshot_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let file = File::new(dir.path().join("deploys.json"));
    file.write_atomic(b"{ not json").await.unwrap();

    assert!(matches!(
        MemoryRepository::open(file).await,
        Err(RepositoryError::Storage(_))
    ));
}

#[tokio::test]
async fn test_out_of_range_status_surfaces_as_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let file = File::new(dir.path().join("deploys.json"));
    let id = "5f0c6b8e-5d7a-4f43-9a57-1f3c1f0e2a11";
    let raw = serde_json::json!([{
        "_id": id,
        "name": "demo",
        "git_repo": "https://git/example",
        "build": { "status": 7 }
    }]);
    file.write_json(&raw).await.unwrap();

    let repository = MemoryRepository::open(file).await.unwrap();
    assert!(matches!(
        repository.get_deploy(id).await,
        Err(RepositoryError::Corrupt(_))
    ));
}

#[tokio::test]
async fn test_failed_snapshot_keeps_create_unapplied() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let repository = MemoryRepository::open(File::new(blocker.join("deploys.json")))
        .await
        .unwrap();
    let result = repository
        .create_deploy(&Deploy::new("demo", "https://git/example", HashMap::new()))
        .await;

    assert!(matches!(result, Err(RepositoryError::Storage(_))));
    assert!(repository.list_deploy().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_snapshot_keeps_documents_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("data");
    let repository = MemoryRepository::open(File::new(data_dir.join("deploys.json")))
        .await
        .unwrap();
    let id = repository
        .create_deploy(&Deploy::new("demo", "https://git/example", HashMap::new()))
        .await
        .unwrap();
    repository
        .set_build_status(&id, Status::Loading)
        .await
        .unwrap();

    // Swap the snapshot directory for a plain file so every write fails
    std::fs::remove_dir_all(&data_dir).unwrap();
    std::fs::write(&data_dir, b"not a directory").unwrap();

    assert!(matches!(
        repository.delete_deploy(&id).await,
        Err(RepositoryError::Storage(_))
    ));
    assert!(matches!(
        repository.set_build_status(&id, Status::Completed).await,
        Err(RepositoryError::Storage(_))
    ));
    assert!(matches!(
        repository
            .record_build_step(&id, &BuildStep::ok(Step::Clone))
            .await,
        Err(RepositoryError::Storage(_))
    ));

    let deploy = repository.get_deploy(&id).await.unwrap();
    assert_eq!(deploy.build.status, Some(Status::Loading));
    assert!(deploy.build.steps.is_empty());
    assert_eq!(repository.list_deploy().await.unwrap().len(), 1);
}
