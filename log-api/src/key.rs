use crate::config::KeyFormat;
use crate::model::LogObject;

const SEGMENT_SEPARATOR: &str = ":";
const PAIR_SEPARATOR: &str = "=";

/// Derives the partition key for a log. Logs with the same tenant,
/// application type and dimensions always land on the same partition.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeyDeriver {
    format: KeyFormat,
}

impl KeyDeriver {
    pub fn new(format: KeyFormat) -> Self {
        Self { format }
    }

    /// Dimensions are ordered by name, so insertion order never affects the key.
    pub fn build_key(&self, tenant_id: Option<&str>, log: Option<&LogObject>) -> String {
        let mut segments: Vec<String> = Vec::new();

        if let Some(tenant_id) = tenant_id.filter(|t| !t.is_empty()) {
            segments.push(tenant_id.to_string());
        }

        if let Some(log) = log {
            if let Some(application_type) =
                log.application_type.as_deref().filter(|a| !a.is_empty())
            {
                segments.push(application_type.to_string());
            }

            let mut dimensions: Vec<_> = log.dimensions.iter().collect();
            dimensions.sort_by(|a, b| a.0.cmp(b.0));
            let pair_separator = match self.format {
                KeyFormat::Delimited => PAIR_SEPARATOR,
                KeyFormat::Legacy => "",
            };
            segments.extend(
                dimensions
                    .into_iter()
                    .map(|(name, value)| format!("{name}{pair_separator}{value}")),
            );
        }

        match self.format {
            KeyFormat::Delimited => segments.join(SEGMENT_SEPARATOR),
            KeyFormat::Legacy => segments.concat(),
        }
    }
}
