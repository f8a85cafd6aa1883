//! Integration tests for spt-entrypoint

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use tempfile::TempDir;

    const ENV_VARS: &[&str] = &[
        "UID",
        "GID",
        "MOD_URLS",
        "CONFIG_PATCHES",
        "DATA_DIRS",
        "SPT_VERSION",
        "ENTRYPOINT_CONFIG",
        "LOG_FORMAT",
        "RUST_LOG",
    ];

    /// Binary running in `dir` with none of our settings inherited
    fn entrypoint(dir: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("spt-entrypoint");
        cmd.current_dir(dir.path());
        for var in ENV_VARS {
            cmd.env_remove(var);
        }
        cmd
    }

    #[test]
    fn version_has_no_trailing_newline() {
        let temp = TempDir::new().unwrap();
        entrypoint(&temp)
            .arg("version")
            .assert()
            .success()
            .stdout(env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn version_flag_not_supported() {
        let temp = TempDir::new().unwrap();
        entrypoint(&temp).arg("--version").assert().failure();
    }

    #[test]
    fn unknown_subcommand_fails() {
        let temp = TempDir::new().unwrap();
        entrypoint(&temp).arg("serve").assert().failure();
    }

    #[test]
    fn help_lists_subcommands() {
        let temp = TempDir::new().unwrap();
        entrypoint(&temp)
            .arg("--help")
            .assert()
            .success()
            .stdout(
                predicate::str::contains("entrypoint")
                    .and(predicate::str::contains("pre-entrypoint"))
                    .and(predicate::str::contains("version")),
            );
    }

    #[test]
    fn malformed_config_patches_fail() {
        let temp = TempDir::new().unwrap();
        entrypoint(&temp)
            .arg("entrypoint")
            .env("CONFIG_PATCHES", "{not json")
            .assert()
            .code(1)
            .stdout(predicate::str::contains("Malformed patch document in CONFIG_PATCHES"));
    }

    #[test]
    fn absolute_patch_target_rejected_before_io() {
        let temp = TempDir::new().unwrap();
        entrypoint(&temp)
            .arg("entrypoint")
            .env(
                "CONFIG_PATCHES",
                r#"{"/etc/passwd":[{"op":"replace","path":"/root","value":"x"}]}"#,
            )
            .assert()
            .code(1)
            .stdout(predicate::str::contains("patch path /etc/passwd not relative"));

        assert!(!temp.path().join("cache").exists());
        assert!(!temp.path().join("spt").exists());
    }

    #[test]
    fn invalid_uid_fails() {
        let temp = TempDir::new().unwrap();
        entrypoint(&temp)
            .arg("entrypoint")
            .env("UID", "spt")
            .assert()
            .code(1)
            .stdout(predicate::str::contains("Invalid value for UID"));
    }

    #[test]
    fn missing_server_without_version_fails() {
        let temp = TempDir::new().unwrap();
        entrypoint(&temp)
            .arg("entrypoint")
            .assert()
            .code(1)
            .stdout(predicate::str::contains("Missing required setting: SPT_VERSION"))
            .stdout(predicate::str::contains("Hint:"));

        for dir in ["cache", "data", "spt"] {
            assert!(temp.path().join(dir).is_dir(), "{dir} not created");
        }
    }

    #[test]
    fn settings_file_relocates_roots() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("entrypoint.toml"),
            "[paths]\ninstall = \"server\"\n",
        )
        .unwrap();

        entrypoint(&temp)
            .arg("entrypoint")
            .assert()
            .code(1)
            .stdout(predicate::str::contains("server/SPT.Server.exe"));
        assert!(temp.path().join("server").is_dir());
    }

    #[test]
    fn invalid_settings_file_fails() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("custom.toml"), "[probe\n").unwrap();

        entrypoint(&temp)
            .args(["entrypoint", "--config", "custom.toml"])
            .assert()
            .code(1)
            .stdout(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn unsupported_mod_archive_fails() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("spt")).unwrap();
        fs::write(temp.path().join("spt/SPT.Server.exe"), "").unwrap();

        entrypoint(&temp)
            .arg("entrypoint")
            .env("MOD_URLS", "https://example.invalid/mods/SAIN.rar")
            .assert()
            .code(1)
            .stdout(predicate::str::contains("unrecognized file type SAIN.rar"));
    }

    #[test]
    fn json_logs() {
        let temp = TempDir::new().unwrap();
        entrypoint(&temp)
            .arg("entrypoint")
            .env("LOG_FORMAT", "json")
            .assert()
            .code(1)
            .stdout(predicate::str::contains(r#""level":"INFO""#));
    }
}
