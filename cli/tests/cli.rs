#[cfg(test)]
mod test {
    use assert_cmd::prelude::*;
    use predicates::prelude::*;
    use std::process::Command;

    fn cmd(data_dir: &assert_fs::TempDir) -> Command {
        let mut cmd = Command::cargo_bin("txdb").unwrap();
        cmd.arg("--data-dir").arg(data_dir.path());
        cmd
    }

    #[test]
    fn unknown_subcommand_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let mut c = Command::cargo_bin("txdb")?;
        c.arg("foobar");
        c.assert().failure().stderr(predicate::str::contains("unrecognized"));
        Ok(())
    }

    #[test]
    fn submit_then_entity_as_of_round_trips_a_document() -> Result<(), Box<dyn std::error::Error>> {
        let data_dir = assert_fs::TempDir::new()?;
        let ops = r#"[{"entity": "picasso", "bt": 100, "document": {"name": "Pablo"}}]"#;

        cmd(&data_dir).arg("submit").arg(ops).assert().success().stdout(predicate::str::contains("applied"));

        cmd(&data_dir)
            .arg("entity-as-of")
            .arg("picasso")
            .assert()
            .success()
            .stdout(predicate::str::contains("Pablo"));

        Ok(())
    }

    #[test]
    fn entity_as_of_reports_absence_for_an_unknown_entity() -> Result<(), Box<dyn std::error::Error>> {
        let data_dir = assert_fs::TempDir::new()?;
        cmd(&data_dir)
            .arg("entity-as-of")
            .arg("nobody")
            .assert()
            .success()
            .stdout(predicate::str::contains("no version found"));
        Ok(())
    }
}
