use figment::Jail;

use super::*;

#[test]
fn defaults() {
    Jail::expect_with(|jail| {
        let config = Config::from(Config::layered(None)).map_err(|e| *e)?;
        assert_eq!(config.commands_dir, Path::new(".claude/commands"));
        assert_eq!(config.git.host, "https://github.com");
        assert!(config.cache.root.ends_with("ccmd"));
        assert_eq!(
            config.commands_dir_in(jail.directory()),
            jail.directory().join(".claude/commands")
        );
        Ok(())
    });
}

#[test]
fn user_file_then_env() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
            commands_dir = "prompts"

            [git]
            host = "https://git.example.com"
            "#,
        )?;
        let user = jail.directory().join("config.toml");

        let config = Config::from(Config::layered(Some(&user))).map_err(|e| *e)?;
        assert_eq!(config.commands_dir, Path::new("prompts"));
        assert_eq!(config.git.host, "https://git.example.com");

        jail.set_env("CCMD_GIT__HOST", "https://mirror.example.com");
        jail.set_env("CCMD_CACHE__ROOT", "/tmp/ccmd-cache");
        let config = Config::from(Config::layered(Some(&user))).map_err(|e| *e)?;
        assert_eq!(config.commands_dir, Path::new("prompts"));
        assert_eq!(config.git.host, "https://mirror.example.com");
        assert_eq!(config.cache.root, Path::new("/tmp/ccmd-cache"));
        Ok(())
    });
}

#[test]
fn missing_user_file_is_ignored() {
    Jail::expect_with(|jail| {
        let absent = jail.directory().join("nope.toml");
        let config = Config::from(Config::layered(Some(&absent))).map_err(|e| *e)?;
        assert_eq!(config.git, GitConfig::default());
        Ok(())
    });
}
