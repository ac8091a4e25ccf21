use super::*;

#[test]
fn valid_paths() {
    let repo = Repo::try_from("owner/tool-1").unwrap();
    assert_eq!(repo.owner(), "owner");
    assert_eq!(repo.name(), "tool-1");
    assert_eq!(repo.to_string(), "owner/tool-1");

    for ok in ["a/b", "My_Org/some-cmd", "0/9"] {
        assert!(Repo::try_from(ok).is_ok(), "{ok} should be accepted");
    }
}

#[test]
fn empty() {
    assert_eq!(Repo::try_from(""), Err(RepoError::Empty));
}

#[test]
fn wrong_shape() {
    for bad in ["tool", "a/b/c", "owner/tool/"] {
        assert_eq!(
            Repo::try_from(bad),
            Err(RepoError::Shape(bad.into())),
            "{bad} should be rejected"
        );
    }
}

#[test]
fn empty_segments() {
    assert_eq!(Repo::try_from("/tool"), Err(RepoError::EmptyOwner("/tool".into())));
    assert_eq!(Repo::try_from("owner/"), Err(RepoError::EmptyName("owner/".into())));
}

#[test]
fn invalid_chars() {
    for bad in ["own er/tool", "owner/to.ol", "owner/tool@v1", "ö/tool"] {
        assert_eq!(
            Repo::try_from(bad),
            Err(RepoError::InvalidCharacters(bad.into())),
            "{bad} should be rejected"
        );
    }
}

#[test]
fn serde_as_string() -> anyhow::Result<()> {
    #[derive(serde::Serialize, serde::Deserialize)]
    struct Wrapper {
        repo: Repo,
    }

    let parsed: Wrapper = toml_edit::de::from_str(r#"repo = "owner/tool""#)?;
    assert_eq!(parsed.repo.name(), "tool");
    let out = toml_edit::ser::to_string(&parsed)?;
    assert_eq!(out.trim(), r#"repo = "owner/tool""#);

    let bad = toml_edit::de::from_str::<Wrapper>(r#"repo = "owner""#);
    assert!(bad.is_err());
    Ok(())
}
