//! Key naming strategies
//!
//! Each credential source looks keys up under a fixed set of names. Global
//! sources use the plain names; bucket-specific sources qualify every name
//! with the bucket, trying `<NAME>.<bucket>` before `<bucket>.<NAME>`.

use super::Scope;

/// Access key names in environment variables
pub const ENV_ACCESS_KEY: &[&str] = &["AWS_ACCESS_KEY_ID"];
/// Access key names in global environment variables, including the legacy name
pub const GLOBAL_ENV_ACCESS_KEY: &[&str] = &["AWS_ACCESS_KEY_ID", "AWS_ACCESS_KEY"];
/// Secret key names in environment variables
pub const ENV_SECRET_KEY: &[&str] = &["AWS_SECRET_KEY", "AWS_SECRET_ACCESS_KEY"];
/// Session token names in environment variables
pub const ENV_SESSION_TOKEN: &[&str] = &["AWS_SESSION_TOKEN"];
/// Role ARN names in environment variables
pub const ENV_ROLE_ARN: &[&str] = &["AWS_ROLE_ARN"];

/// Access key names in process properties
pub const PROPERTY_ACCESS_KEY: &[&str] = &["aws.accessKeyId"];
/// Secret key names in process properties
pub const PROPERTY_SECRET_KEY: &[&str] = &["aws.secretKey"];
/// Session token names in process properties
pub const PROPERTY_SESSION_TOKEN: &[&str] = &["aws.sessionToken"];
/// Role ARN names in process properties
pub const PROPERTY_ROLE_ARN: &[&str] = &["aws.roleArn"];

/// Access key names in credential files
pub const FILE_ACCESS_KEY: &[&str] = &["accessKey"];
/// Secret key names in credential files
pub const FILE_SECRET_KEY: &[&str] = &["secretKey"];
/// Role ARN names in credential files
pub const FILE_ROLE_ARN: &[&str] = &["roleArn"];

/// Candidate lookup names for `names` under the given scope.
///
/// Bucket-scoped candidates are emitted name by name, each as
/// `<NAME>.<bucket>` followed by `<bucket>.<NAME>`.
pub fn candidates(names: &[&str], scope: &Scope) -> Vec<String> {
    match scope {
        Scope::Global => names.iter().map(|name| name.to_string()).collect(),
        Scope::Bucket(bucket) => names
            .iter()
            .flat_map(|name| [format!("{}.{}", name, bucket), format!("{}.{}", bucket, name)])
            .collect(),
    }
}

/// Candidate environment variable names for `names` under the given scope
pub fn env_candidates(names: &[&str], scope: &Scope) -> Vec<String> {
    candidates(names, scope)
        .iter()
        .map(|name| to_env_name(name))
        .collect()
}

/// Turn an arbitrary key into a legal environment variable name.
///
/// Uppercases, maps `-` and `.` to `_`, and drops anything outside
/// `[A-Z0-9_]`.
pub fn to_env_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '-' | '.' => '_',
            c => c.to_ascii_uppercase(),
        })
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || *c == '_')
        .collect()
}
