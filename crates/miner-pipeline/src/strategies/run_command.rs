//! `RunCommand`: run a shell command per record, with optional commands
//! before and after the set.

use std::process::{Command, Stdio};

use miner_pvl::PvlObject;
use miner_types::{MinerError, ResourceList, Result, SharedResource};

use crate::registry::StrategyFactory;
use crate::strategy::{apply_to_resources, get_globals, Strategy, StrategyCore};

pub struct RunCommandStrategy {
    core: StrategyCore,
    pre_continue: bool,
    post_continue: bool,
    skip: bool,
}

impl RunCommandStrategy {
    pub fn new(
        definition: &PvlObject,
        globals: &[SharedResource],
        factory: &StrategyFactory,
    ) -> Result<Self> {
        let core = StrategyCore::new(definition, globals, factory.geometry_factory())?;
        let has = |key: &str| core.keys().exists(key) || core.keys().exists(&format!("{key}Keyword"));
        if !(has("Command") || has("PreCommand") || has("PostCommand")) {
            return Err(MinerError::Config(format!(
                "RunCommand strategy [{}] requires Command, PreCommand or PostCommand",
                core.name()
            )));
        }
        let pre_continue = core.bool_or("OnPreCommandErrorContinue", false)?;
        let post_continue = core.bool_or("OnPostCommandErrorContinue", false)?;
        let skip = core.bool_or("SkipCommand", false)?;
        Ok(Self {
            core,
            pre_continue,
            post_continue,
            skip,
        })
    }

    /// Run `command` through `sh -c`. A non-zero exit is an error carrying
    /// the command's stderr.
    fn execute(&self, command: &str) -> Result<()> {
        if self.skip {
            tracing::info!(strategy = %self.core.name(), command, "dry run, command not executed");
            return Ok(());
        }
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| MinerError::ExternalProcess {
                command: command.to_string(),
                message: format!("failed to spawn: {e}"),
            })?;
        let exit_code = output.status.code().unwrap_or(-1);
        tracing::debug!(
            strategy = %self.core.name(),
            exit_code,
            stdout_len = output.stdout.len(),
            stderr_len = output.stderr.len(),
            "command completed"
        );
        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(MinerError::ExternalProcess {
                command: command.to_string(),
                message: format!("exit status {exit_code}: {}", stderr.trim()),
            })
        }
    }

    /// Run a set-level command; failures are logged and ignored when
    /// `proceed` is set.
    fn run_stage(&self, key: &str, globals: &[SharedResource], proceed: bool) -> Result<()> {
        let command = self.core.translate_keyword_args(key, globals, "");
        if command.is_empty() {
            return Ok(());
        }
        match self.execute(&command) {
            Err(err) if proceed => {
                tracing::warn!(strategy = %self.core.name(), stage = key, error = %err, "continuing after failed command");
                Ok(())
            }
            other => other,
        }
    }
}

impl Strategy for RunCommandStrategy {
    fn core(&self) -> &StrategyCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StrategyCore {
        &mut self.core
    }

    fn apply(&mut self, resources: &mut ResourceList, globals: &[SharedResource]) -> Result<usize> {
        self.run_stage("PreCommand", globals, self.pre_continue)?;
        let result = apply_to_resources(self, resources, globals)?;
        self.run_stage("PostCommand", globals, self.post_continue)?;
        Ok(result)
    }

    /// A record whose command fails is discarded.
    fn apply_one(&mut self, resource: &SharedResource, globals: &[SharedResource]) -> Result<usize> {
        let command = self
            .core
            .translate_keyword_args("Command", &get_globals(resource, globals), "");
        if command.is_empty() {
            return Ok(1);
        }
        match self.execute(&command) {
            Ok(()) => Ok(1),
            Err(err) => {
                self.core
                    .debug(&format!("{} discarded: {err}", resource.name()));
                resource.discard();
                Ok(0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::parameters_resource;
    use crate::strategies::testing::{active_names, build, records};

    #[test]
    fn failing_record_commands_discard() {
        let mut s = build(
            "Object = Strategy\n Name = run\n Type = RunCommand\n Command = \"test %1 = ok\"\n \
             CommandArgs = Status\nEnd_Object",
        );
        let mut list = records("Status", &["ok", "bad", "ok"]);
        assert_eq!(s.apply(&mut list, &[]).unwrap(), 2);
        assert_eq!(active_names(&list), vec!["r0", "r2"]);
    }

    #[test]
    fn pre_and_post_commands_run_around_records() {
        let dir = tempfile::tempdir().unwrap();
        let g = parameters_resource([("Dir", dir.path().to_str().unwrap())]);
        let mut s = build(
            "Object = Strategy\n Name = run\n Type = RunCommand\n \
             PreCommand = \"echo pre > %1/log\"\n PreCommandArgs = Dir\n \
             Command = \"echo %1 >> %2/log\"\n CommandArgs = (Identity, Dir)\n \
             PostCommand = \"echo post >> %1/log\"\n PostCommandArgs = Dir\nEnd_Object",
        );
        let mut list = records("K", &["a", "b"]);
        s.apply(&mut list, &[g]).unwrap();
        let log = std::fs::read_to_string(dir.path().join("log")).unwrap();
        assert_eq!(log, "pre\nr0\nr1\npost\n");
    }

    #[test]
    fn pre_command_failure_policy() {
        let mut strict = build(
            "Object = Strategy\n Name = run\n Type = RunCommand\n PreCommand = \"exit 3\"\nEnd_Object",
        );
        let err = strict.apply(&mut Vec::new(), &[]).unwrap_err();
        assert_eq!(err.kind(), "ExternalProcessError");

        let mut lenient = build(
            "Object = Strategy\n Name = run\n Type = RunCommand\n PreCommand = \"exit 3\"\n \
             OnPreCommandErrorContinue = true\nEnd_Object",
        );
        assert!(lenient.apply(&mut Vec::new(), &[]).is_ok());
    }

    #[test]
    fn skip_command_is_dry_run() {
        let mut s = build(
            "Object = Strategy\n Name = run\n Type = RunCommand\n Command = \"exit 1\"\n \
             SkipCommand = true\nEnd_Object",
        );
        let mut list = records("K", &["a"]);
        assert_eq!(s.apply(&mut list, &[]).unwrap(), 1);
        assert!(list[0].is_active());
    }
}
