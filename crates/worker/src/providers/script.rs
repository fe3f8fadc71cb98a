use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use agent_core::{
    models::{
        ComponentResultSpec, ComponentSpec, ComponentStep, DeploymentSpec, DeploymentStep, State,
        ValidationRule,
    },
    task_log,
    traits::TargetProvider,
    AgentError, AgentResult,
};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptEngine {
    Bash,
    Powershell,
}

/// 脚本提供者配置，取自拓扑绑定的 `config`
#[derive(Debug, Clone)]
pub struct ScriptProviderConfig {
    pub name: String,
    pub get_script: String,
    pub apply_script: String,
    pub remove_script: Option<String>,
    pub script_folder: PathBuf,
    pub staging_folder: PathBuf,
    pub script_engine: ScriptEngine,
}

impl ScriptProviderConfig {
    pub fn from_map(properties: &HashMap<String, String>) -> AgentResult<Self> {
        let required = |key: &str| {
            properties
                .get(key)
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or_else(|| {
                    AgentError::Configuration(format!(
                        "invalid script provider config, expected '{key}'"
                    ))
                })
        };

        let script_engine = match properties.get("scriptEngine").map(String::as_str) {
            None | Some("") | Some("bash") => ScriptEngine::Bash,
            Some("powershell") => ScriptEngine::Powershell,
            Some(other) => {
                return Err(AgentError::Configuration(format!(
                    "invalid script engine '{other}', expected 'bash' or 'powershell'"
                )))
            }
        };

        Ok(Self {
            name: properties.get("name").cloned().unwrap_or_default(),
            get_script: required("getScript")?,
            apply_script: required("applyScript")?,
            remove_script: properties
                .get("removeScript")
                .filter(|v| !v.is_empty())
                .cloned(),
            script_folder: properties
                .get("scriptFolder")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            staging_folder: properties
                .get("stagingFolder")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            script_engine,
        })
    }
}

/// 脚本提供者
///
/// 输入以 JSON 文件写入暂存目录，文件路径作为参数传给脚本；脚本把结果写到
/// 同目录下的 `<id>-output.json`。
pub struct ScriptProvider {
    config: ScriptProviderConfig,
}

impl ScriptProvider {
    pub fn new(config: ScriptProviderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScriptProviderConfig {
        &self.config
    }

    async fn run_script(
        &self,
        script: &str,
        inputs: &[&dyn ErasedJson],
    ) -> AgentResult<Option<Vec<u8>>> {
        let id = uuid::Uuid::new_v4().to_string();
        let mut staged = Vec::with_capacity(inputs.len());
        let result = self.run_staged(&id, script, inputs, &mut staged).await;

        for path in staged {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                debug!(path = %path.display(), error = %e, "failed to remove staged input");
            }
        }
        result
    }

    async fn run_staged(
        &self,
        id: &str,
        script: &str,
        inputs: &[&dyn ErasedJson],
        staged: &mut Vec<PathBuf>,
    ) -> AgentResult<Option<Vec<u8>>> {
        for (index, input) in inputs.iter().enumerate() {
            let name = if index == 0 {
                format!("{id}.json")
            } else {
                format!("{id}-{index}.json")
            };
            let path = self.config.staging_folder.join(name);
            tokio::fs::write(&path, input.to_json()?)
                .await
                .map_err(|e| stage_error(&path, e))?;
            staged.push(path);
        }

        let script_path = self.config.script_folder.join(script);
        self.run_command(&script_path, staged.as_slice()).await?;

        let output_path = self.config.staging_folder.join(format!("{id}-output.json"));
        match tokio::fs::read(&output_path).await {
            Ok(output) => {
                let _ = tokio::fs::remove_file(&output_path).await;
                Ok(Some(output))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(stage_error(&output_path, e)),
        }
    }

    async fn run_command(&self, script: &Path, args: &[PathBuf]) -> AgentResult<()> {
        let mut command = match self.config.script_engine {
            ScriptEngine::Bash => Command::new(script),
            ScriptEngine::Powershell => {
                let mut command = Command::new("powershell");
                command.arg(script);
                command
            }
        };
        command
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        info!(script = %script.display(), "running script");
        let output = command.output().await.map_err(|e| {
            AgentError::Provider(format!("failed to start script {}: {e}", script.display()))
        })?;
        task_log::record_output("stdout", &output.stdout);
        task_log::record_output("stderr", &output.stderr);

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(
                script = %script.display(),
                exit_code = ?output.status.code(),
                stderr = %stderr.trim_end(),
                "script failed"
            );
            return Err(AgentError::Provider(format!(
                "script {} exited with {:?}: {}",
                script.display(),
                output.status.code(),
                stderr.trim_end()
            )));
        }
        Ok(())
    }

    /// 执行一组组件步骤；脚本没有写出结果时按 `default_state` 记录每个组件
    async fn apply_group(
        &self,
        script: &str,
        deployment: &DeploymentSpec,
        components: &[&ComponentStep],
        default_state: State,
        results: &mut HashMap<String, ComponentResultSpec>,
    ) -> AgentResult<()> {
        let specs: Vec<&ComponentSpec> = components.iter().map(|step| &step.component).collect();
        let output = self.run_script(script, &[deployment as &dyn ErasedJson, &specs]).await?;

        let reported: HashMap<String, ComponentResultSpec> = match output {
            Some(bytes) if !bytes.iter().all(u8::is_ascii_whitespace) => {
                parse_output(&bytes, "map of component results")?
            }
            _ => HashMap::new(),
        };

        for step in components {
            let name = &step.component.name;
            let result = reported
                .get(name)
                .cloned()
                .unwrap_or_else(|| ComponentResultSpec::new(default_state, ""));
            results.insert(name.clone(), result);
        }
        Ok(())
    }
}

/// 暂存文件的内容，允许不同类型的输入放在同一个切片里
trait ErasedJson: Send + Sync {
    fn to_json(&self) -> AgentResult<Vec<u8>>;
}

impl<T: Serialize + Send + Sync> ErasedJson for T {
    fn to_json(&self) -> AgentResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

fn stage_error(path: &Path, err: std::io::Error) -> AgentError {
    AgentError::Provider(format!("staging file {}: {err}", path.display()))
}

fn parse_output<T: DeserializeOwned>(bytes: &[u8], expected: &str) -> AgentResult<T> {
    serde_json::from_slice(bytes).map_err(|e| {
        AgentError::Provider(format!(
            "failed to parse script output (expected {expected}): {e}"
        ))
    })
}

#[async_trait]
impl TargetProvider for ScriptProvider {
    async fn get_validation_rule(&self) -> AgentResult<ValidationRule> {
        Ok(ValidationRule::default())
    }

    async fn get(
        &self,
        deployment: &DeploymentSpec,
        references: &[ComponentStep],
    ) -> AgentResult<Vec<ComponentSpec>> {
        let output = self
            .run_script(
                &self.config.get_script,
                &[deployment as &dyn ErasedJson, &references],
            )
            .await?;
        match output {
            Some(bytes) => parse_output(&bytes, "list of component specs"),
            None => Err(AgentError::Provider(
                "get script produced no output file".to_string(),
            )),
        }
    }

    async fn apply(
        &self,
        deployment: &DeploymentSpec,
        step: &DeploymentStep,
        is_dry_run: bool,
    ) -> AgentResult<HashMap<String, ComponentResultSpec>> {
        let mut results = HashMap::new();
        if is_dry_run {
            return Ok(results);
        }

        let (updates, deletes): (Vec<&ComponentStep>, Vec<&ComponentStep>) =
            step.components.iter().partition(|c| c.is_update());

        if !updates.is_empty() {
            self.apply_group(
                &self.config.apply_script,
                deployment,
                &updates,
                State::Updated,
                &mut results,
            )
            .await?;
        }

        if !deletes.is_empty() {
            match &self.config.remove_script {
                Some(script) => {
                    self.apply_group(script, deployment, &deletes, State::Deleted, &mut results)
                        .await?;
                }
                None => {
                    warn!(
                        components = deletes.len(),
                        "no removeScript configured, delete steps reported as done"
                    );
                    for step in deletes {
                        results.insert(
                            step.component.name.clone(),
                            ComponentResultSpec::new(State::Deleted, ""),
                        );
                    }
                }
            }
        }

        Ok(results)
    }
}
