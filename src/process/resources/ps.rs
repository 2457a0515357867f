/*!
 * ps Sampler
 * macOS / BSD strategy reading `ps -o rss=,%cpu= -p <pid>`
 */

use super::{ResourceSampler, ResourceUsage, SampleError};
use crate::core::types::OsPid;
use std::process::{Command, Stdio};

#[derive(Debug, Clone, Copy, Default)]
pub struct PsSampler;

impl PsSampler {
    pub fn new() -> Self {
        Self
    }
}

impl ResourceSampler for PsSampler {
    fn name(&self) -> &'static str {
        "ps"
    }

    fn sample(&self, pid: OsPid) -> Result<ResourceUsage, SampleError> {
        let output = Command::new("ps")
            .args(["-o", "rss=,%cpu=", "-p", &pid.to_string()])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()?;

        // ps exits 1 when the pid does not exist
        if !output.status.success() {
            return Err(SampleError::NotFound(pid));
        }

        parse_ps_line(&String::from_utf8_lossy(&output.stdout))
            .unwrap_or(Err(SampleError::NotFound(pid)))
    }
}

/// `"  1536   0.3\n"` -> 1.5 MB, 0.3 %
fn parse_ps_line(output: &str) -> Option<Result<ResourceUsage, SampleError>> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    let mut parts = line.split_whitespace();

    let parsed = match (
        parts.next().and_then(|v| v.parse::<u64>().ok()),
        parts.next().and_then(|v| v.replace(',', ".").parse::<f64>().ok()),
    ) {
        (Some(rss_kb), Some(cpu)) => Ok(ResourceUsage::measured(rss_kb as f64 / 1024.0, cpu)),
        _ => Err(SampleError::Parse(line.to_string())),
    };
    Some(parsed)
}
