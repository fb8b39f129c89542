//! Credential chain integration tests
//!
//! Verifies the lookup order of the sixteen credential sources, role
//! assumption on top of the basic chain, and the on-disk settings files.

mod common;

use async_trait::async_trait;
use common::{env_with_global_keys, CountingCredentials, RecordingRoleAssumer, TEST_BUCKET};
use s3_url_handler::credentials::role::StaticCredentials;
use s3_url_handler::credentials::{
    CredentialServices, Credentials, CredentialsCache, CredentialsError, ProviderChain,
    RoleAssumer,
};
use s3_url_handler::env::{MemoryEnvironment, SystemEnvironment};
use serial_test::serial;
use std::collections::HashMap;
use std::sync::Arc;

const ROLE_ARN: &str = "arn:aws:iam::123456789012:role/artifact-reader";

fn services(env: MemoryEnvironment) -> CredentialServices {
    CredentialServices::new(Arc::new(env), Arc::new(RecordingRoleAssumer::default()))
}

async fn resolve(services: &CredentialServices) -> Result<Credentials, CredentialsError> {
    ProviderChain::for_bucket(TEST_BUCKET).resolve(services).await
}

fn credentials_file(access_key: &str, secret_key: &str) -> String {
    format!(
        "# written by the release tooling\naccessKey = {}\nsecretKey = {}\n",
        access_key, secret_key
    )
}

// ============================================================================
// Basic source order
// ============================================================================

#[tokio::test]
async fn test_bucket_env_beats_global_env() {
    let env = env_with_global_keys()
        .with_var("AWS_ACCESS_KEY_ID_RELEASES", "AKIDBUCKET")
        .with_var("AWS_SECRET_KEY_RELEASES", "bucket-secret");

    let credentials = resolve(&services(env)).await.unwrap();

    assert_eq!(credentials.access_key_id(), "AKIDBUCKET");
    assert_eq!(credentials.secret_access_key(), "bucket-secret");
}

#[tokio::test]
async fn test_bucket_prefixed_env_names() {
    let env = MemoryEnvironment::new()
        .with_var("RELEASES_AWS_ACCESS_KEY_ID", "AKIDPREFIXED")
        .with_var("RELEASES_AWS_SECRET_ACCESS_KEY", "prefixed-secret")
        .with_var("RELEASES_AWS_SESSION_TOKEN", "prefixed-token");

    let credentials = resolve(&services(env)).await.unwrap();

    assert_eq!(credentials.access_key_id(), "AKIDPREFIXED");
    assert_eq!(credentials.session_token(), Some("prefixed-token"));
}

#[tokio::test]
async fn test_incomplete_bucket_env_falls_through() {
    let env = env_with_global_keys().with_var("AWS_ACCESS_KEY_ID_RELEASES", "AKIDLONELY");

    let credentials = resolve(&services(env)).await.unwrap();

    assert_eq!(credentials.access_key_id(), "AKIDGLOBAL");
}

#[tokio::test]
async fn test_legacy_global_access_key_name() {
    let env = MemoryEnvironment::new()
        .with_var("AWS_ACCESS_KEY", "AKIDLEGACY")
        .with_var("AWS_SECRET_ACCESS_KEY", "legacy-secret");

    let credentials = resolve(&services(env)).await.unwrap();

    assert_eq!(credentials.access_key_id(), "AKIDLEGACY");
}

#[tokio::test]
async fn test_bucket_properties_beat_settings_files() {
    let env = MemoryEnvironment::new()
        .with_property("aws.accessKeyId.releases", "AKIDPROPS")
        .with_property("aws.secretKey.releases", "props-secret")
        .with_file(".s3credentials_releases", credentials_file("AKIDFILE", "file-secret"));

    let credentials = resolve(&services(env)).await.unwrap();

    assert_eq!(credentials.access_key_id(), "AKIDPROPS");
}

#[tokio::test]
async fn test_bucket_settings_file_beats_global_env() {
    let env = env_with_global_keys().with_file(
        ".s3credentials_releases",
        credentials_file("AKIDFILE", "file-secret"),
    );

    let credentials = resolve(&services(env)).await.unwrap();

    assert_eq!(credentials.access_key_id(), "AKIDFILE");
}

#[tokio::test]
async fn test_settings_file_name_order() {
    let env = MemoryEnvironment::new()
        .with_file(".releases_s3credentials", credentials_file("AKIDSECOND", "s"))
        .with_file(".s3credentials_releases", credentials_file("AKIDFIRST", "s"));

    let credentials = resolve(&services(env.clone())).await.unwrap();
    assert_eq!(credentials.access_key_id(), "AKIDFIRST");

    let only_second = MemoryEnvironment::new()
        .with_file(".releases_s3credentials", credentials_file("AKIDSECOND", "s"));
    let credentials = resolve(&services(only_second)).await.unwrap();
    assert_eq!(credentials.access_key_id(), "AKIDSECOND");
}

#[tokio::test]
async fn test_global_properties_beat_profile() {
    let env = MemoryEnvironment::new()
        .with_property("aws.accessKeyId", "AKIDPROPS")
        .with_property("aws.secretKey", "props-secret");
    let services = services(env).with_profile(Arc::new(StaticCredentials::new(
        Credentials::new("AKIDPROFILE", "profile-secret"),
    )));

    let credentials = resolve(&services).await.unwrap();

    assert_eq!(credentials.access_key_id(), "AKIDPROPS");
}

#[tokio::test]
async fn test_profile_beats_global_settings_file() {
    let env = MemoryEnvironment::new()
        .with_file(".s3credentials", credentials_file("AKIDGLOBALFILE", "s"));
    let services = services(env).with_profile(Arc::new(StaticCredentials::new(
        Credentials::new("AKIDPROFILE", "profile-secret"),
    )));

    let credentials = resolve(&services).await.unwrap();

    assert_eq!(credentials.access_key_id(), "AKIDPROFILE");
}

#[tokio::test]
async fn test_instance_metadata_is_last() {
    let imds = CountingCredentials::new("AKIDIMDS");

    let with_file = services(
        MemoryEnvironment::new().with_file(".s3credentials", credentials_file("AKIDGLOBALFILE", "s")),
    )
    .with_instance_metadata(imds.clone());
    let credentials = resolve(&with_file).await.unwrap();
    assert_eq!(credentials.access_key_id(), "AKIDGLOBALFILE");
    assert_eq!(imds.count(), 0);

    let bare = services(MemoryEnvironment::new()).with_instance_metadata(imds.clone());
    let credentials = resolve(&bare).await.unwrap();
    assert_eq!(credentials.access_key_id(), "AKIDIMDS");
    assert_eq!(imds.count(), 1);
}

#[tokio::test]
async fn test_nothing_configured() {
    let err = resolve(&services(MemoryEnvironment::new())).await.unwrap_err();

    match err {
        CredentialsError::Unavailable { bucket, tried } => {
            assert_eq!(bucket, TEST_BUCKET);
            assert_eq!(tried.len(), 16);
            assert_eq!(tried[0], "assume-role[env(releases)]");
            assert_eq!(tried[7], "env(releases)");
            assert_eq!(tried[15], "instance-metadata");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

// ============================================================================
// Role assumption
// ============================================================================

#[tokio::test]
async fn test_global_role_arn_assumes_with_basic_credentials() {
    let assumer = Arc::new(RecordingRoleAssumer::default());
    let env = env_with_global_keys().with_var("AWS_ROLE_ARN", ROLE_ARN);
    let services = CredentialServices::new(Arc::new(env), assumer.clone());

    let credentials = resolve(&services).await.unwrap();

    assert_eq!(credentials.access_key_id(), "ASIATEMPORARY");
    assert_eq!(credentials.session_token(), Some("session-token"));
    let calls = assumer.calls.lock().unwrap();
    assert_eq!(
        *calls,
        vec![(
            "AKIDGLOBAL".to_string(),
            ROLE_ARN.to_string(),
            "s3-url-handler".to_string()
        )]
    );
}

#[tokio::test]
async fn test_bucket_role_in_properties_with_file_credentials() {
    let assumer = Arc::new(RecordingRoleAssumer::default());
    let env = MemoryEnvironment::new()
        .with_property("releases.aws.roleArn", ROLE_ARN)
        .with_file(".s3credentials", credentials_file("AKIDBASE", "base-secret"));
    let services =
        CredentialServices::new(Arc::new(env), assumer.clone()).with_session_name("nightly-build");

    let credentials = resolve(&services).await.unwrap();

    assert_eq!(credentials.access_key_id(), "ASIATEMPORARY");
    let calls = assumer.calls.lock().unwrap();
    assert_eq!(calls[0].0, "AKIDBASE");
    assert_eq!(calls[0].2, "nightly-build");
}

#[tokio::test]
async fn test_role_arn_in_settings_file() {
    let assumer = Arc::new(RecordingRoleAssumer::default());
    let env = env_with_global_keys().with_file(
        ".s3credentials_releases",
        format!("roleArn={}\n", ROLE_ARN),
    );
    let services = CredentialServices::new(Arc::new(env), assumer.clone());

    let credentials = resolve(&services).await.unwrap();

    assert_eq!(credentials.access_key_id(), "ASIATEMPORARY");
    assert_eq!(assumer.calls.lock().unwrap()[0].1, ROLE_ARN);
}

/// Only a bucket role ARN is configured; the base identity comes from
/// instance metadata at the end of the basic chain
#[tokio::test]
async fn test_bucket_role_with_instance_metadata_base() {
    let assumer = Arc::new(RecordingRoleAssumer::default());
    let imds = CountingCredentials::new("AKIDINSTANCE");
    let env = MemoryEnvironment::new().with_var("AWS_ROLE_ARN_RELEASES", ROLE_ARN);
    let services = CredentialServices::new(Arc::new(env), assumer.clone())
        .with_instance_metadata(imds.clone());

    let credentials = resolve(&services).await.unwrap();

    assert_eq!(credentials.session_token(), Some("session-token"));
    assert_eq!(imds.count(), 1);
    assert_eq!(assumer.calls.lock().unwrap()[0].0, "AKIDINSTANCE");
}

#[tokio::test]
async fn test_role_arn_without_base_credentials() {
    let assumer = Arc::new(RecordingRoleAssumer::default());
    let env = MemoryEnvironment::new().with_var("AWS_ROLE_ARN", ROLE_ARN);
    let services = CredentialServices::new(Arc::new(env), assumer.clone());

    let err = resolve(&services).await.unwrap_err();

    assert!(matches!(err, CredentialsError::Unavailable { .. }));
    assert!(assumer.calls.lock().unwrap().is_empty());
}

struct RejectingRoleAssumer;

#[async_trait]
impl RoleAssumer for RejectingRoleAssumer {
    async fn assume_role(
        &self,
        _base: &Credentials,
        role_arn: &str,
        _session_name: &str,
    ) -> Result<Credentials, CredentialsError> {
        Err(CredentialsError::AssumeRole {
            role_arn: role_arn.to_string(),
            message: "AccessDenied".into(),
        })
    }
}

#[tokio::test]
async fn test_failed_role_assumption_falls_back_to_basic_credentials() {
    let env = env_with_global_keys().with_var("AWS_ROLE_ARN", ROLE_ARN);
    let services = CredentialServices::new(Arc::new(env), Arc::new(RejectingRoleAssumer));

    let credentials = resolve(&services).await.unwrap();

    assert_eq!(credentials.access_key_id(), "AKIDGLOBAL");
    assert_eq!(credentials.session_token(), None);
}

// ============================================================================
// Cache
// ============================================================================

#[tokio::test]
async fn test_cache_resolves_once_per_bucket() {
    let profile = CountingCredentials::new("AKIDPROFILE");
    let services = services(MemoryEnvironment::new()).with_profile(profile.clone());
    let cache = CredentialsCache::new();

    let releases = ProviderChain::for_bucket(TEST_BUCKET);
    let snapshots = ProviderChain::for_bucket("snapshots");

    cache.get_or_resolve(&releases, &services).await.unwrap();
    cache.get_or_resolve(&releases, &services).await.unwrap();
    cache.get_or_resolve(&snapshots, &services).await.unwrap();

    assert_eq!(profile.count(), 2);
    assert_eq!(cache.len(), 2);

    cache.invalidate(TEST_BUCKET);
    cache.get_or_resolve(&releases, &services).await.unwrap();
    assert_eq!(profile.count(), 3);
}

// ============================================================================
// Settings directory on disk
// ============================================================================

#[tokio::test]
#[serial]
async fn test_settings_files_read_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(".s3credentials_releases"),
        credentials_file("AKIDDISK", "disk-secret"),
    )
    .unwrap();

    let env = SystemEnvironment::new(HashMap::new(), Some(dir.path().to_path_buf()));
    let services = CredentialServices::new(Arc::new(env), Arc::new(RecordingRoleAssumer::default()));

    let credentials = resolve(&services).await.unwrap();

    assert_eq!(credentials.access_key_id(), "AKIDDISK");
    assert_eq!(credentials.secret_access_key(), "disk-secret");
}

#[tokio::test]
#[serial]
async fn test_process_env_beats_disk_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(".s3credentials_releases"),
        credentials_file("AKIDDISK", "disk-secret"),
    )
    .unwrap();

    std::env::set_var("AWS_ACCESS_KEY_ID_RELEASES", "AKIDPROCESS");
    std::env::set_var("AWS_SECRET_KEY_RELEASES", "process-secret");

    let env = SystemEnvironment::new(HashMap::new(), Some(dir.path().to_path_buf()));
    let services = CredentialServices::new(Arc::new(env), Arc::new(RecordingRoleAssumer::default()));
    let result = resolve(&services).await;

    std::env::remove_var("AWS_ACCESS_KEY_ID_RELEASES");
    std::env::remove_var("AWS_SECRET_KEY_RELEASES");

    assert_eq!(result.unwrap().access_key_id(), "AKIDPROCESS");
}

#[tokio::test]
#[serial]
async fn test_properties_from_system_environment() {
    let mut properties = HashMap::new();
    properties.insert("aws.accessKeyId.releases".to_string(), "AKIDCONFIG".to_string());
    properties.insert("aws.secretKey.releases".to_string(), "config-secret".to_string());

    let env = SystemEnvironment::new(properties, None);
    let services = CredentialServices::new(Arc::new(env), Arc::new(RecordingRoleAssumer::default()));

    let credentials = resolve(&services).await.unwrap();

    assert_eq!(credentials.access_key_id(), "AKIDCONFIG");
}
