//! Integration tests for the settings merger.
//!
//! These tests exercise the merger through the public API on a realistic
//! settings document and verify:
//! - Empty resolution is the identity under both policies
//! - Replace-all and merge policies on an entry with unrelated children
//! - Creation of missing entries
//! - Byte-for-byte preservation of everything outside rewritten entries
//! - Last-write-wins when two mappings target one server

use std::path::PathBuf;
use std::sync::Arc;

use settingsmith_core::{
    Credential, CredentialResolver, Execution, MemoryCredentialStore, MergePolicy,
    ResolvedCredential, ResolvedCredentialMap, Secret, ServerCredentialMapping, ServerId,
    SettingsMerger, TempArtifactTracker,
};
use tempfile::TempDir;

const TEMPLATE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<settings xmlns="http://maven.apache.org/SETTINGS/1.2.0"
          xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <!-- keep this comment -->
  <localRepository>${user.home}/.m2/repository</localRepository>
  <mirrors>
    <mirror>
      <id>internal-mirror</id>
      <mirrorOf>*</mirrorOf>
      <url>https://repo.example.com/maven2</url>
    </mirror>
  </mirrors>
  <servers>
    <server>
      <id>internal</id>
      <username>placeholder</username>
      <password>placeholder</password>
      <configuration>
        <httpHeaders>
          <property><name>X-Trace</name><value>1</value></property>
        </httpHeaders>
      </configuration>
      <filePermissions>664</filePermissions>
    </server>
    <server>
      <id>untouched</id>
      <username>keep-me</username>
    </server>
  </servers>
  <profiles/>
</settings>
"#;

fn username_password(username: &str, password: &str) -> ResolvedCredential {
    ResolvedCredential::UsernamePassword {
        username: username.to_string(),
        password: Secret::new(password),
    }
}

fn only(server: &str, credential: ResolvedCredential) -> ResolvedCredentialMap {
    let mut map = ResolvedCredentialMap::new();
    map.insert(ServerId::new(server), credential);
    map
}

/// Text of the `<server>` entry whose id is `id`.
fn server_block<'a>(document: &'a str, id: &str) -> &'a str {
    let marker = format!("<id>{}</id>", id);
    let at = document.find(&marker).expect("server id present");
    let start = document[..at].rfind("<server>").unwrap();
    let end = at + document[at..].find("</server>").unwrap() + "</server>".len();
    &document[start..end]
}

#[test]
fn test_identity_under_both_policies() {
    let empty = ResolvedCredentialMap::new();
    for policy in [MergePolicy::REPLACE_ALL, MergePolicy::MERGE] {
        let merged = SettingsMerger::new(policy).merge(TEMPLATE, &empty).unwrap();
        assert_eq!(merged, TEMPLATE);
    }
}

#[test]
fn test_replace_all_leaves_only_auth_block() {
    let merged = SettingsMerger::new(MergePolicy::REPLACE_ALL)
        .merge(TEMPLATE, &only("internal", username_password("ci", "pw")))
        .unwrap();

    let block = server_block(&merged, "internal");
    assert_eq!(
        block,
        "<server>\n      <id>internal</id>\n      <username>ci</username>\n      <password>pw</password>\n    </server>"
    );
    assert!(!merged.contains("X-Trace"));
    assert!(!merged.contains("filePermissions"));
}

#[test]
fn test_merge_keeps_unrelated_children_verbatim() {
    let merged = SettingsMerger::new(MergePolicy::MERGE)
        .merge(TEMPLATE, &only("internal", username_password("ci", "pw")))
        .unwrap();

    let block = server_block(&merged, "internal");
    assert!(block.contains("<username>ci</username>"));
    assert!(block.contains("<password>pw</password>"));
    assert!(!block.contains("placeholder"));
    assert!(block.contains(
        "      <configuration>\n        <httpHeaders>\n          <property><name>X-Trace</name><value>1</value></property>\n        </httpHeaders>\n      </configuration>\n"
    ));
    assert!(block.contains("<filePermissions>664</filePermissions>"));
}

#[test]
fn test_missing_entry_is_created_and_others_untouched() {
    let merged = SettingsMerger::new(MergePolicy::REPLACE_ALL)
        .merge(TEMPLATE, &only("thirdparty", username_password("tp", "tp-pw")))
        .unwrap();

    let block = server_block(&merged, "thirdparty");
    assert!(block.contains("<username>tp</username>"));
    assert_eq!(
        server_block(&merged, "untouched"),
        server_block(TEMPLATE, "untouched")
    );
    assert_eq!(
        server_block(&merged, "internal"),
        server_block(TEMPLATE, "internal")
    );
}

#[test]
fn test_bytes_outside_rewritten_entry_round_trip() {
    let merged = SettingsMerger::new(MergePolicy::MERGE)
        .merge(TEMPLATE, &only("untouched", username_password("new", "pw")))
        .unwrap();

    let prefix_end = TEMPLATE.find("<id>untouched</id>").unwrap();
    assert_eq!(&merged[..prefix_end], &TEMPLATE[..prefix_end]);

    let suffix = &TEMPLATE[TEMPLATE.rfind("</servers>").unwrap()..];
    assert!(merged.ends_with(suffix));
}

#[test]
fn test_private_key_entry_references_file() {
    let merged = SettingsMerger::new(MergePolicy::MERGE)
        .merge(
            TEMPLATE,
            &only(
                "untouched",
                ResolvedCredential::SecretFile {
                    username: "git".to_string(),
                    file_path: PathBuf::from("/scratch/private-key-abc.pem"),
                    passphrase: Some(Secret::new("pp")),
                },
            ),
        )
        .unwrap();

    let block = server_block(&merged, "untouched");
    assert_eq!(
        block,
        "<server>\n      <id>untouched</id>\n      <username>git</username>\n      <privateKey>/scratch/private-key-abc.pem</privateKey>\n      <passphrase>pp</passphrase>\n    </server>"
    );
}

#[tokio::test]
async fn test_last_write_wins_through_resolver() {
    let scratch = TempDir::new().unwrap();
    let execution = Execution::new("merge-props", Arc::new(TempArtifactTracker::new()));
    let store = MemoryCredentialStore::new();
    for (id, user) in [("first", "one"), ("second", "two")] {
        store.insert(
            id,
            Credential::UsernamePassword {
                username: user.to_string(),
                password: Secret::new("pw"),
            },
        );
    }

    let mappings = [
        ServerCredentialMapping::new("internal", "first"),
        ServerCredentialMapping::new("internal", "second"),
    ];
    let resolved = CredentialResolver::new(&execution, &store, scratch.path())
        .resolve(&mappings)
        .await
        .unwrap();

    let merged = SettingsMerger::new(MergePolicy::MERGE)
        .merge(TEMPLATE, &resolved)
        .unwrap();
    let block = server_block(&merged, "internal");
    assert!(block.contains("<username>two</username>"));
    assert!(!block.contains("<username>one</username>"));
}
