//! kubelet systemd unit and configuration file
//!
//! The unit's `ExecStart` is parsed into the binary and its flags, edited as
//! a flag list and written back one flag per line. Everything else in the
//! unit is kept verbatim.

use base64::Engine;

use metal_common::crd::{FileContentInline, ENCODING_BASE64};
use metal_common::{Error, Result};

use crate::ensure::ensure_string_with_prefix;

const EXEC_START: &str = "ExecStart=";
const FLAG_INDENT: &str = "    ";

/// Feature gates removed from the kubelet configuration
pub const REMOVED_FEATURE_GATES: [&str; 3] =
    ["VolumeSnapshotDataSource", "CSINodeInfo", "CSIDriverRegistry"];

/// Ensure `--cloud-provider=external` on the kubelet command line
///
/// Returns `None` when the unit has no `ExecStart`.
pub fn ensure_kubelet_service_unit(content: &str) -> Option<String> {
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.iter().position(|l| l.trim_start().starts_with(EXEC_START))?;

    let mut end = start;
    while end < lines.len() - 1 && lines[end].trim_end().ends_with('\\') {
        end += 1;
    }

    let command: String = lines[start..=end]
        .iter()
        .map(|l| l.trim_end().trim_end_matches('\\'))
        .collect::<Vec<_>>()
        .join(" ");
    let command = command.trim_start().trim_start_matches(EXEC_START);
    let mut words = command.split_whitespace().map(str::to_string);
    let binary = words.next()?;
    let mut flags: Vec<String> = words.collect();

    ensure_string_with_prefix(&mut flags, "--cloud-provider=", "--cloud-provider=external");

    let rendered = serialize_exec_start(&binary, &flags);
    let mut edited: Vec<&str> = Vec::with_capacity(lines.len());
    edited.extend(&lines[..start]);
    edited.push(&rendered);
    edited.extend(&lines[end + 1..]);

    let mut out = edited.join("\n");
    if content.ends_with('\n') {
        out.push('\n');
    }
    Some(out)
}

fn serialize_exec_start(binary: &str, flags: &[String]) -> String {
    let mut out = format!("{EXEC_START}{binary}");
    for flag in flags {
        out.push_str(" \\\n");
        out.push_str(FLAG_INDENT);
        out.push_str(flag);
    }
    out
}

/// Drop obsolete feature gates from the kubelet configuration file
///
/// Returns `Ok(false)` when nothing had to change so the file is left as is.
pub fn ensure_kubelet_configuration(inline: &mut FileContentInline) -> Result<bool> {
    let base64 = inline.encoding == ENCODING_BASE64;
    let raw = if base64 {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(inline.data.trim())
            .map_err(|e| Error::serialization_for_kind("KubeletConfiguration", e.to_string()))?;
        String::from_utf8(bytes)
            .map_err(|e| Error::serialization_for_kind("KubeletConfiguration", e.to_string()))?
    } else {
        inline.data.clone()
    };

    let mut config: serde_yaml::Value = serde_yaml::from_str(&raw)
        .map_err(|e| Error::serialization_for_kind("KubeletConfiguration", e.to_string()))?;

    let Some(root) = config.as_mapping_mut() else {
        return Ok(false);
    };
    let Some(gates) = root
        .get_mut("featureGates")
        .and_then(serde_yaml::Value::as_mapping_mut)
    else {
        return Ok(false);
    };

    let before = gates.len();
    for gate in REMOVED_FEATURE_GATES {
        gates.remove(gate);
    }
    if gates.len() == before {
        return Ok(false);
    }
    if gates.is_empty() {
        root.remove("featureGates");
    }

    let rendered = serde_yaml::to_string(&config)
        .map_err(|e| Error::serialization_for_kind("KubeletConfiguration", e.to_string()))?;
    inline.data = if base64 {
        base64::engine::general_purpose::STANDARD.encode(rendered)
    } else {
        rendered
    };
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNIT: &str = "[Unit]
Description=kubelet daemon
After=containerd.service
[Service]
Restart=always
ExecStartPre=/opt/bin/init-kubelet.sh
ExecStart=/opt/bin/kubelet \\
    --bootstrap-kubeconfig=/var/lib/kubelet/kubeconfig-bootstrap \\
    --config=/var/lib/kubelet/config/kubelet \\
    --cloud-provider=aws
[Install]
WantedBy=multi-user.target
";

    // =========================================================================
    // Unit
    // =========================================================================

    #[test]
    fn cloud_provider_flag_is_replaced() {
        let out = ensure_kubelet_service_unit(UNIT).unwrap();
        assert_eq!(
            out,
            "[Unit]
Description=kubelet daemon
After=containerd.service
[Service]
Restart=always
ExecStartPre=/opt/bin/init-kubelet.sh
ExecStart=/opt/bin/kubelet \\
    --bootstrap-kubeconfig=/var/lib/kubelet/kubeconfig-bootstrap \\
    --config=/var/lib/kubelet/config/kubelet \\
    --cloud-provider=external
[Install]
WantedBy=multi-user.target
"
        );
    }

    #[test]
    fn single_line_command_is_split_and_stable() {
        let unit = "[Service]\nExecStart=/opt/bin/kubelet --v=2 --config=/k\n";
        let once = ensure_kubelet_service_unit(unit).unwrap();
        assert_eq!(
            once,
            concat!(
                "[Service]\n",
                "ExecStart=/opt/bin/kubelet \\\n",
                "    --v=2 \\\n",
                "    --config=/k \\\n",
                "    --cloud-provider=external\n",
            )
        );
        assert_eq!(ensure_kubelet_service_unit(&once).unwrap(), once);
    }

    #[test]
    fn unit_without_exec_start_is_skipped() {
        assert_eq!(ensure_kubelet_service_unit("[Service]\nRestart=always\n"), None);
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    const CONFIG: &str = "apiVersion: kubelet.config.k8s.io/v1beta1
kind: KubeletConfiguration
featureGates:
  CSINodeInfo: true
  RotateKubeletServerCertificate: true
  VolumeSnapshotDataSource: true
maxPods: 110
";

    #[test]
    fn obsolete_gates_are_removed() {
        let mut inline = FileContentInline {
            encoding: String::new(),
            data: CONFIG.to_string(),
        };
        assert!(ensure_kubelet_configuration(&mut inline).unwrap());

        let config: serde_yaml::Value = serde_yaml::from_str(&inline.data).unwrap();
        let gates = config["featureGates"].as_mapping().unwrap();
        assert_eq!(gates.len(), 1);
        assert!(gates.contains_key("RotateKubeletServerCertificate"));
        assert_eq!(config["maxPods"].as_u64(), Some(110));

        let again = inline.clone();
        assert!(!ensure_kubelet_configuration(&mut inline).unwrap());
        assert_eq!(inline, again);
    }

    #[test]
    fn base64_content_stays_encoded() {
        let mut inline = FileContentInline {
            encoding: ENCODING_BASE64.to_string(),
            data: base64::engine::general_purpose::STANDARD
                .encode("featureGates:\n  CSIDriverRegistry: true\nmaxPods: 50\n"),
        };
        assert!(ensure_kubelet_configuration(&mut inline).unwrap());

        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&inline.data)
            .unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), "maxPods: 50\n");
    }

    #[test]
    fn config_without_gates_is_untouched() {
        let mut inline = FileContentInline {
            encoding: String::new(),
            data: "maxPods: 110 # keep my comment\n".to_string(),
        };
        assert!(!ensure_kubelet_configuration(&mut inline).unwrap());
        assert_eq!(inline.data, "maxPods: 110 # keep my comment\n");
    }
}
