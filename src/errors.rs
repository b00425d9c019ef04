use thiserror::Error;

/// Error kinds the rest of the engine reasons about when deciding retry policy.
///
/// Raw cluster-API errors never cross a module boundary; [`classify`] is the
/// single place that turns them into one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Permission,
    Validation,
    Timeout,
    Execution,
    Unknown,
}

impl ErrorKind {
    pub fn as_metric_label(&self) -> &'static str {
        match self {
            ErrorKind::Permission => "permission",
            ErrorKind::Validation => "validation",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Execution => "execution",
            ErrorKind::Unknown => "unknown",
        }
    }
}

/// The crate-wide typed error. Carries enough context (`resource`, `verb`,
/// `namespace`, `subresource`, `operation`) to build an actionable message
/// without re-parsing the original error at every call site.
#[derive(Error, Debug)]
#[error("{kind:?} error during {operation}: {message}")]
pub struct ChaosError {
    pub kind: ErrorKind,
    pub operation: String,
    pub message: String,
    pub resource: Option<String>,
    pub verb: Option<String>,
    pub namespace: Option<String>,
    pub subresource: Option<String>,
    #[source]
    pub original: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ChaosError {
    pub fn new(kind: ErrorKind, operation: impl Into<String>, message: impl Into<String>) -> Self {
        ChaosError {
            kind,
            operation: operation.into(),
            message: message.into(),
            resource: None,
            verb: None,
            namespace: None,
            subresource: None,
            original: None,
        }
    }

    pub fn validation(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, operation, message)
    }

    pub fn execution(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Execution, operation, message)
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn with_verb(mut self, verb: impl Into<String>) -> Self {
        self.verb = Some(verb.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_subresource(mut self, subresource: impl Into<String>) -> Self {
        self.subresource = Some(subresource.into());
        self
    }

    /// Builds the `kubectl auth can-i` hint used verbatim in status messages,
    /// events, and history `error.message` for permission errors.
    pub fn actionable_hint(&self) -> Option<String> {
        if self.kind != ErrorKind::Permission {
            return None;
        }
        let verb = self.verb.as_deref().unwrap_or("get");
        let resource = self.resource.as_deref().unwrap_or("resources");
        match &self.namespace {
            Some(ns) => Some(format!("kubectl auth can-i {verb} {resource} -n {ns}")),
            None => Some(format!("kubectl auth can-i {verb} {resource}")),
        }
    }

    /// The message to surface verbatim in `status.message`, events, and
    /// `history.error.message`.
    pub fn actionable_message(&self) -> String {
        match self.actionable_hint() {
            Some(hint) => format!("{}: {}", self.message, hint),
            None => self.message.clone(),
        }
    }
}

/// Classify a raw `kube::Error` into a [`ChaosError`] with kind + extracted
/// `{verb, resource, subresource, namespace}`.
///
/// HTTP-status mapping per the classifier contract:
/// 403/401 -> Permission, 408/504-shaped -> Timeout, 400/422 -> Validation,
/// 404 -> Execution (ResourceNotFound subkind), everything else -> Execution,
/// unparseable bodies -> Unknown.
pub fn classify(err: &kube::Error, operation: &str) -> ChaosError {
    match err {
        kube::Error::Api(api_err) => {
            let kind = match api_err.code {
                401 | 403 => ErrorKind::Permission,
                408 => ErrorKind::Timeout,
                400 | 422 => ErrorKind::Validation,
                404 => ErrorKind::Execution,
                _ => ErrorKind::Execution,
            };
            let (verb, resource, namespace) = extract_permission_context(&api_err.message);
            ChaosError {
                kind,
                operation: operation.to_string(),
                message: api_err.message.clone(),
                resource,
                verb,
                namespace,
                subresource: None,
                original: None,
            }
        }
        kube::Error::Service(_) => {
            ChaosError::new(ErrorKind::Timeout, operation, err.to_string())
        }
        other => ChaosError::new(ErrorKind::Unknown, operation, other.to_string()),
    }
}

/// Pulls `{verb, resource, namespace}` out of a forbidden-error message shaped
/// like `forbidden: cannot <verb> resource "<resource>" in namespace "<ns>"`.
fn extract_permission_context(message: &str) -> (Option<String>, Option<String>, Option<String>) {
    let verb = message
        .split("cannot ")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .map(str::to_string);

    let resource = extract_quoted_after(message, "resource \"");
    let namespace = extract_quoted_after(message, "namespace \"");

    (verb, resource, namespace)
}

fn extract_quoted_after(haystack: &str, marker: &str) -> Option<String> {
    let start = haystack.find(marker)? + marker.len();
    let rest = &haystack[start..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}
