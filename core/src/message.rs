use serde::{Deserialize, Serialize};

/// A process invocation, either as a single shell string or as an argv list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandLine {
    Shell(String),
    Argv(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub command: Option<CommandLine>,
    #[serde(default)]
    pub shell: bool,
}

impl ExecuteRequest {
    pub fn argv<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: Some(CommandLine::Argv(args.into_iter().map(Into::into).collect())),
            shell: false,
        }
    }

    pub fn shell(command: impl Into<String>) -> Self {
        Self {
            command: Some(CommandLine::Shell(command.into())),
            shell: true,
        }
    }

    /// The command to run, falling back to an empty one of the kind the
    /// `shell` flag implies.
    pub fn command_line(&self) -> CommandLine {
        match &self.command {
            Some(command) => command.clone(),
            None if self.shell => CommandLine::Shell(String::new()),
            None => CommandLine::Argv(Vec::new()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum ExecuteResponse {
    #[serde(rename = "success")]
    Success {
        output: String,
        error: String,
        returncode: i64,
    },
    #[serde(rename = "error")]
    Error { message: String },
}

impl ExecuteResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecuteResponse::Success { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_accepts_argv_and_string() {
        let json = r#"{"command":["python","-c","print(1)"],"shell":false}"#;
        let request: ExecuteRequest = serde_json::from_str(json).unwrap();
        assert_eq!(
            request.command,
            Some(CommandLine::Argv(vec![
                "python".into(),
                "-c".into(),
                "print(1)".into()
            ]))
        );

        let json = r#"{"command":"ls -la ~/","shell":true}"#;
        let request: ExecuteRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.command, Some(CommandLine::Shell("ls -la ~/".into())));
        assert!(request.shell);
    }

    #[test]
    fn test_request_defaults() {
        let request: ExecuteRequest = serde_json::from_str("{}").unwrap();
        assert!(!request.shell);
        assert_eq!(request.command_line(), CommandLine::Argv(vec![]));

        let request: ExecuteRequest = serde_json::from_str(r#"{"shell":true}"#).unwrap();
        assert_eq!(request.command_line(), CommandLine::Shell(String::new()));
    }

    #[test]
    fn test_response_serialization() {
        let response = ExecuteResponse::Success {
            output: "hi\n".into(),
            error: String::new(),
            returncode: 0,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains(r#""status":"success""#));
        assert!(json.contains(r#""returncode":0"#));

        let json = serde_json::to_string(&ExecuteResponse::Error {
            message: "boom".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"status":"error","message":"boom"}"#);
    }

    #[test]
    fn test_response_deserialization() {
        let json = r#"{"status":"success","output":"","error":"oops","returncode":2}"#;
        let response: ExecuteResponse = serde_json::from_str(json).unwrap();

        match response {
            ExecuteResponse::Success { returncode, error, .. } => {
                assert_eq!(returncode, 2);
                assert_eq!(error, "oops");
            }
            _ => panic!("Expected Success variant"),
        }
    }

    #[test]
    fn test_response_accepts_crash_exit_codes() {
        let json = r#"{"status":"success","output":"","error":"","returncode":3221225477}"#;
        let response: ExecuteResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(
            response,
            ExecuteResponse::Success {
                returncode: 3_221_225_477,
                ..
            }
        ));
    }
}
