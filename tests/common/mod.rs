//! Shared test fixture: mock provider binaries on PATH.
//!
//! The scripts emulate just enough of each provider CLI for the
//! end-to-end scenarios, and append their argv to the file named by
//! `CLOUDGATE_MOCK_LOG` so tests can prove whether a child ran.

use std::io::Write;
use std::path::PathBuf;
use std::sync::OnceLock;

pub struct Fixture {
    _dir: tempfile::TempDir,
    pub log_path: PathBuf,
}

static FIXTURE: OnceLock<Fixture> = OnceLock::new();

const AWS_SCRIPT: &str = r#"#!/bin/sh
if [ -n "$CLOUDGATE_MOCK_LOG" ]; then echo "aws $@" >> "$CLOUDGATE_MOCK_LOG"; fi
case "$1 $2" in
  "ec2 describe-instances") sleep 5; exit 0 ;;
  "s3api put-public-access-block") printf '{}'; exit 0 ;;
  "s3api delete-public-access-block") printf '{}'; exit 0 ;;
  "sts get-caller-identity") printf '{"Account":"123456789012","Profile":"%s"}' "$AWS_PROFILE"; exit 0 ;;
  "iam list-users") echo "Unable to locate credentials" >&2; exit 255 ;;
esac
echo "aws: unsupported mock invocation: $@" >&2
exit 1
"#;

const AZ_SCRIPT: &str = r#"#!/bin/sh
if [ -n "$CLOUDGATE_MOCK_LOG" ]; then echo "az $@" >> "$CLOUDGATE_MOCK_LOG"; fi
case "$1 $2" in
  "vm list") printf '[{"name":"x"}]'; exit 0 ;;
  "account show") printf '{"id":"%s"}' "$AZURE_SUBSCRIPTION_ID"; exit 0 ;;
esac
echo "az: unsupported mock invocation: $@" >&2
exit 1
"#;

const GCLOUD_SCRIPT: &str = r#"#!/bin/sh
if [ -n "$CLOUDGATE_MOCK_LOG" ]; then echo "gcloud $@" >> "$CLOUDGATE_MOCK_LOG"; fi
case "$1 $2" in
  "compute instances") printf 'vm-1 RUNNING\nvm-2 STOPPED\nvm-3 RUNNING\n'; exit 0 ;;
esac
echo "gcloud: unsupported mock invocation: $@" >&2
exit 1
"#;

fn write_script(dir: &std::path::Path, name: &str, body: &str) {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).expect("create mock script");
    file.write_all(body.as_bytes()).expect("write mock script");
    drop(file);
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("chmod mock script");
}

/// Install the mock binaries once per test process and prepend their
/// directory to PATH.
pub fn fixture() -> &'static Fixture {
    FIXTURE.get_or_init(|| {
        let dir = tempfile::tempdir().expect("fixture dir");
        write_script(dir.path(), "aws", AWS_SCRIPT);
        write_script(dir.path(), "az", AZ_SCRIPT);
        write_script(dir.path(), "gcloud", GCLOUD_SCRIPT);

        let old_path = std::env::var_os("PATH").unwrap_or_default();
        let mut paths = vec![dir.path().to_path_buf()];
        paths.extend(std::env::split_paths(&old_path));
        let new_path = std::env::join_paths(paths).expect("join PATH");
        std::env::set_var("PATH", new_path);

        let log_path = dir.path().join("mock-invocations.log");
        std::env::set_var("CLOUDGATE_MOCK_LOG", &log_path);

        Fixture {
            _dir: dir,
            log_path,
        }
    })
}

/// Everything the mock binaries have been invoked with so far.
pub fn mock_log() -> String {
    std::fs::read_to_string(&fixture().log_path).unwrap_or_default()
}
