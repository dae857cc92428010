use std::io::Write;

use super::*;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config file");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

fn relationship(lookup: Option<RawLookup>, parent_key: Option<&str>) -> RawRelationshipSettings {
    RawRelationshipSettings {
        parent: "place".to_string(),
        child: "contact_profile".to_string(),
        dependency_key: "place_uuid".to_string(),
        lookup,
        parent_key: parent_key.map(str::to_string),
    }
}

#[test]
fn defaults_are_valid() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert!(settings.cache.enabled);
    assert_eq!(settings.cache.namespace, "loadcache");
    assert_eq!(settings.cache.default_ttl, Duration::from_secs(300));
    assert_eq!(settings.cache.capacity.get(), 10_000);
    assert_eq!(settings.cache.cascade_depth, 3);
    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
    assert!(settings.entities.is_empty());
    assert!(settings.relationships.is_empty());
}

#[test]
fn zero_ttl_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.default_ttl_seconds = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero ttl");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.default_ttl_seconds",
            ..
        }
    ));
}

#[test]
fn ttl_beyond_upper_bound_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.default_ttl_seconds = Some(MAX_TTL_SECONDS + 1);
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "cache.default_ttl_seconds",
            ..
        })
    ));

    let mut raw = RawSettings::default();
    raw.entities.insert(
        "place".to_string(),
        RawEntitySettings {
            ttl_seconds: Some(1_000_000_000_000),
            enabled: None,
        },
    );
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "entities.ttl_seconds",
            ..
        })
    ));

    let mut raw = RawSettings::default();
    raw.cache.default_ttl_seconds = Some(MAX_TTL_SECONDS);
    let settings = Settings::from_raw(raw).expect("upper bound is inclusive");
    assert_eq!(settings.cache.default_ttl, Duration::from_secs(MAX_TTL_SECONDS));
}

#[test]
fn load_rejects_oversized_ttl_from_file() {
    let file = write_config(
        r#"
[cache]
default_ttl_seconds = 1000000000000
"#,
    );
    assert!(matches!(
        load(Some(file.path())),
        Err(LoadError::Invalid {
            key: "cache.default_ttl_seconds",
            ..
        })
    ));
}

#[test]
fn namespace_must_not_contain_separator() {
    let mut raw = RawSettings::default();
    raw.cache.namespace = Some("a:b".to_string());
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn entity_overrides_are_parsed_by_name() {
    let mut raw = RawSettings::default();
    raw.entities.insert(
        "place".to_string(),
        RawEntitySettings {
            ttl_seconds: Some(30),
            enabled: Some(false),
        },
    );

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(
        settings.entities.get(&EntityType::Place),
        Some(&EntitySettings {
            ttl: Some(Duration::from_secs(30)),
            enabled: Some(false),
        })
    );
}

#[test]
fn unknown_entity_override_is_rejected() {
    let mut raw = RawSettings::default();
    raw.entities
        .insert("warehouse".to_string(), RawEntitySettings::default());
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "entities",
            ..
        })
    ));
}

#[test]
fn relationship_without_lookup_mode_is_rejected() {
    let mut raw = RawSettings::default();
    raw.relationships.push(relationship(None, None));
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "relationships.lookup",
            ..
        })
    ));
}

#[test]
fn foreign_field_lookup_requires_parent_key() {
    let mut raw = RawSettings::default();
    raw.relationships
        .push(relationship(Some(RawLookup::ForeignField), None));
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "relationships.parent_key",
            ..
        })
    ));

    let mut raw = RawSettings::default();
    raw.relationships
        .push(relationship(Some(RawLookup::ParentIdentity), Some("owner_uuid")));
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn relationships_resolve_to_lookup_modes() {
    let mut raw = RawSettings::default();
    raw.relationships
        .push(relationship(Some(RawLookup::ParentIdentity), None));
    raw.relationships
        .push(relationship(Some(RawLookup::ForeignField), Some("owner_uuid")));

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(
        settings.relationships[0].lookup,
        DependencyLookup::ParentIdentity
    );
    assert_eq!(
        settings.relationships[1].lookup,
        DependencyLookup::ForeignField {
            parent_key: "owner_uuid".to_string()
        }
    );
}

#[test]
fn load_reads_explicit_file() {
    let file = write_config(
        r#"
[logging]
level = "debug"
json = true

[cache]
namespace = "tenant-cache"
default_ttl_seconds = 60
cascade_depth = 1

[entities.contact_profile]
ttl_seconds = 15

[[relationships]]
parent = "contact_profile"
child = "place"
dependency_key = "place_uuid"
lookup = "parent_identity"
"#,
    );

    let settings = load(Some(file.path())).expect("settings load");
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert!(matches!(settings.logging.format, LogFormat::Json));
    assert_eq!(settings.cache.namespace, "tenant-cache");
    assert_eq!(settings.cache.default_ttl, Duration::from_secs(60));
    assert_eq!(settings.cache.cascade_depth, 1);
    assert_eq!(
        settings
            .entities
            .get(&EntityType::ContactProfile)
            .and_then(|entity| entity.ttl),
        Some(Duration::from_secs(15))
    );
    assert_eq!(settings.relationships.len(), 1);
    assert_eq!(settings.relationships[0].child, EntityType::Place);
}

#[test]
fn load_rejects_unknown_lookup_mode() {
    let file = write_config(
        r#"
[[relationships]]
parent = "place"
child = "contact_profile"
dependency_key = "place_uuid"
lookup = "sometimes"
"#,
    );
    assert!(matches!(load(Some(file.path())), Err(LoadError::Build(_))));
}

#[test]
fn missing_explicit_file_is_an_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let missing = dir.path().join("absent.toml");
    assert!(load(Some(&missing)).is_err());
}
