use std::sync::Arc;

use super::*;
use crate::fs::MemoryFs;

const MANIFEST: &str = r#"# team commands
name = "demo"
version = "0.1.0"
description = "shared prompts"

commands = ["acme/review", "acme/deploy@^1.2"]

tags = ["ops"]
"#;

fn store(content: Option<&str>) -> anyhow::Result<(Arc<MemoryFs>, ConfigStore)> {
    let fs = Arc::new(MemoryFs::new());
    if let Some(content) = content {
        fs.write(Path::new("/p/ccmd.toml"), content.as_bytes())?;
    }
    let store = ConfigStore::new("/p/ccmd.toml", fs.clone());
    Ok((fs, store))
}

#[test]
fn parses_flat_commands() -> anyhow::Result<()> {
    let config: Config = MANIFEST.parse()?;
    assert_eq!(config.metadata().name.as_deref(), Some("demo"));
    assert_eq!(config.metadata().tags, Some(vec!["ops".to_owned()]));

    let commands = config.commands();
    assert_eq!(commands.len(), 2);
    assert_eq!(commands[0].repo().to_string(), "acme/review");
    assert_eq!(commands[0].declared_version(), None);
    assert_eq!(commands[0].version_spec(), "latest");
    assert_eq!(commands[1].name(), "deploy");
    assert_eq!(commands[1].version_spec(), "^1.2");
    Ok(())
}

#[test]
fn parses_table_commands() -> anyhow::Result<()> {
    let config: Config = r#"
[[commands]]
repo = "acme/review"

[[commands]]
repo = "acme/deploy"
version = "v2.0.0"
"#
    .parse()?;

    let specs: Vec<_> = config.commands().iter().map(ToString::to_string).collect();
    assert_eq!(specs, ["acme/review", "acme/deploy@v2.0.0"]);
    Ok(())
}

#[test]
fn empty_document_has_no_commands() -> anyhow::Result<()> {
    let config: Config = "".parse()?;
    assert!(config.commands().is_empty());
    assert_eq!(config.metadata(), &Metadata::default());
    Ok(())
}

#[test]
fn rejects_invalid_manifests() {
    assert!(matches!(
        "surprise = 1".parse::<Config>(),
        Err(ConfigError::Schema(_))
    ));
    assert!(matches!(
        "commands = [\"not-a-repo\"]".parse::<Config>(),
        Err(ConfigError::Repo(_))
    ));
    assert!(matches!(
        "commands = [\"acme/review@bad spec\"]".parse::<Config>(),
        Err(ConfigError::InvalidVersion { .. })
    ));
    assert!(matches!(
        ConfigDocument::parse("commands = ["),
        Err(ConfigError::InvalidToml(_))
    ));
}

#[test]
fn version_spec_syntax() {
    for ok in [
        "latest",
        "v1.0.0",
        "1.0.0-rc.1+build",
        "^1.2",
        ">=1, <2",
        "1.x || 3",
        "main",
        "feature/x_y",
        "0123456789abcdef0123456789abcdef01234567",
    ] {
        assert!(validate_version_spec(ok).is_ok(), "{ok} should be accepted");
    }
    for bad in ["", "a..b", ".hidden", "trailing.", "has space", "semi;colon", "^not-semver"] {
        assert!(validate_version_spec(bad).is_err(), "{bad} should be rejected");
    }
}

#[test]
fn command_strings() -> anyhow::Result<()> {
    let command: ConfigCommand = "acme/review@".parse()?;
    assert_eq!(command.declared_version(), None);
    assert_eq!(command.to_string(), "acme/review");

    let command: ConfigCommand = " acme/review@~1.4 ".parse()?;
    assert_eq!(command.to_string(), "acme/review@~1.4");
    assert!(command.is_named("review"));
    assert!(command.is_named("acme/review"));
    assert!(!command.is_named("acme"));
    Ok(())
}

#[test]
fn add_then_remove_preserves_document() -> anyhow::Result<()> {
    let (fs, store) = store(Some(MANIFEST))?;

    store.add("acme/lint@v0.3.0".parse()?)?;
    let written = String::from_utf8(fs.read(store.path())?)?;
    assert!(written.contains(r#"commands = ["acme/review", "acme/deploy@^1.2", "acme/lint@v0.3.0"]"#));

    store.remove(&"acme/lint".parse()?)?;
    let written = String::from_utf8(fs.read(store.path())?)?;
    assert!(written.starts_with("# team commands\nname = \"demo\"\nversion = \"0.1.0\"\n"));
    assert!(written.contains(r#"commands = ["acme/review", "acme/deploy@^1.2"]"#));
    assert!(written.trim_end().ends_with(r#"tags = ["ops"]"#));
    assert_eq!(written.parse::<Config>()?, MANIFEST.parse::<Config>()?);
    Ok(())
}

#[test]
fn add_rejects_duplicates() -> anyhow::Result<()> {
    let (_, store) = store(Some(MANIFEST))?;
    let err = store.add("acme/review@v9.9.9".parse()?).unwrap_err();
    assert!(matches!(err, ConfigError::Duplicate(_)));
    Ok(())
}

#[test]
fn add_creates_minimal_manifest() -> anyhow::Result<()> {
    let (fs, store) = store(None)?;
    store.add("acme/review".parse()?)?;

    let written = String::from_utf8(fs.read(store.path())?)?;
    assert!(written.contains(r#"commands = ["acme/review"]"#));
    assert_eq!(store.load()?.config().commands().len(), 1);
    Ok(())
}

#[test]
fn remove_and_update_require_declaration() -> anyhow::Result<()> {
    let (_, store) = store(Some(MANIFEST))?;
    let missing: Repo = "acme/missing".parse()?;
    assert!(matches!(store.remove(&missing), Err(ConfigError::NotFound(_))));
    assert!(matches!(
        store.update(&missing, None),
        Err(ConfigError::NotFound(_))
    ));

    let (_, empty) = self::store(None)?;
    assert!(matches!(empty.remove(&missing), Err(ConfigError::Missing(_))));
    Ok(())
}

#[test]
fn update_rewrites_in_place() -> anyhow::Result<()> {
    let (fs, store) = store(Some(MANIFEST))?;
    let previous = store.update(&"acme/review".parse()?, Some("v2.0.0".into()))?;
    assert_eq!(previous.declared_version(), None);

    let written = String::from_utf8(fs.read(store.path())?)?;
    assert!(written.contains(r#"commands = ["acme/review@v2.0.0", "acme/deploy@^1.2"]"#));
    assert!(written.starts_with("# team commands\n"));
    Ok(())
}

#[test]
fn table_form_is_rewritten_as_strings_on_edit() -> anyhow::Result<()> {
    let (fs, store) = store(Some(
        r#"name = "demo"

[[commands]]
repo = "acme/review"
version = "^1"
"#,
    ))?;

    store.add("acme/lint".parse()?)?;
    let doc = store.load()?;
    let specs: Vec<_> = doc.config().commands().iter().map(ToString::to_string).collect();
    assert_eq!(specs, ["acme/review@^1", "acme/lint"]);

    let written = String::from_utf8(fs.read(store.path())?)?;
    assert!(written.starts_with("name = \"demo\"\n"));
    assert!(!written.contains("[[commands]]"));
    Ok(())
}

#[test]
fn init_refuses_to_overwrite() -> anyhow::Result<()> {
    let (fs, store) = store(None)?;
    store.init(Some("demo".into()))?;
    let written = String::from_utf8(fs.read(store.path())?)?;
    assert!(written.starts_with("name = \"demo\"\n"));
    assert_eq!(store.load()?.config().metadata().name.as_deref(), Some("demo"));
    assert!(matches!(store.init(None), Err(ConfigError::Exists(_))));
    Ok(())
}
