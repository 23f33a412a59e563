//! PowerShell shim for Windows guests
//!
//! Unlike the bash shim, the user script travels inside the shim as base64
//! and is piped into a child `powershell` process. The whole run is
//! transcribed to `c:\output.log`, which is copied to COM1 when that port
//! exists so the transcript shows up in the server console log.

use super::{ShimParams, ShimRenderer};
use crate::TesterError;
use crate::config::ShimType;
use crate::template::render_template;

const TEMPLATE: &str = r#"filter timestamp {
    "$(Get-Date -format o) $_"
}

$global:http_timeout = 10
$global:output_log = "c:\output.log"
$global:serial_device = "COM1"

$testscript = "{{ user_script_b64 }}"

$env:os_auth_token = "{{ auth_token }}"
$env:metadata_key = "{{ status_key }}"
$env:metadata_value_ok = "{{ status_ok }}"
$env:metadata_value_err = "{{ status_error }}"
$env:metadata_exitcode_key = "{{ exitcode_key }}"

$env:instance_id = (Invoke-RestMethod -Uri http://169.254.169.254/openstack/latest/meta_data.json -TimeoutSec $global:http_timeout).uuid

function SetMetadata($key, $val) {
    $url = "{{ endpoint }}/servers/$($env:instance_id)/metadata"
    Write-Output "Reporting: $key -> $val to $url" | timestamp
    $headers = @{
        'X-Auth-Token' = $env:os_auth_token
    }
    $body = @{
        metadata = @{
            $key = $val.toString()
        }
    } | ConvertTo-Json
    Invoke-RestMethod -Method POST -Uri $url -ContentType 'application/json' -Body $body -Headers $headers -TimeoutSec $global:http_timeout
}

function Report($code) {
    if($code -eq 0) {
        SetMetadata $env:metadata_key $env:metadata_value_ok
    } else {
        SetMetadata $env:metadata_exitcode_key $code
        SetMetadata $env:metadata_key $env:metadata_value_err
    }
}

Start-Transcript $global:output_log
try {
    if($testscript -ne "") {
        $script = [System.Text.Encoding]::UTF8.GetString([Convert]::FromBase64String($testscript))
        Write-Output "Executing user test script" | timestamp
        Write-Output $script | powershell -noprofile -
        $code = $LASTEXITCODE
        if($code -ne 0) {
            Report $code
            [System.Environment]::Exit(0)
        }
    }
    Report 0
} catch {
    Write-Output $_.Exception | Format-List -force
} finally {
    Stop-Transcript
    if ($global:serial_device -in [System.IO.Ports.SerialPort]::GetPortNames()) {
        $port = New-Object System.IO.Ports.SerialPort $global:serial_device,9600,None,8,one
        $port.Open()
        $port.Write([IO.File]::ReadAllText($global:output_log))
        $port.Close()
    }
}
"#;

/// Renders the PowerShell shim
#[derive(Debug, Clone, Copy, Default)]
pub struct PowerShellShim;

impl ShimRenderer for PowerShellShim {
    fn shim_type(&self) -> ShimType {
        ShimType::PowerShell
    }

    fn render(&self, params: &ShimParams) -> Result<String, TesterError> {
        render_template("run_test.ps1", TEMPLATE, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ShimParams {
        ShimParams::new("T", "E")
            .with_user_script_path("/user_test.sh")
            .with_status_keys("K", "OK", "ERR", "EX")
    }

    #[test]
    fn test_render_contains_parameters() {
        let script = PowerShellShim.render(&params()).unwrap();

        assert!(script.contains(r#"$env:os_auth_token = "T""#));
        assert!(script.contains(r#"$env:metadata_key = "K""#));
        assert!(script.contains(r#"$env:metadata_value_ok = "OK""#));
        assert!(script.contains(r#"$env:metadata_value_err = "ERR""#));
        assert!(script.contains(r#"$env:metadata_exitcode_key = "EX""#));
        assert!(script.contains(r#"$url = "E/servers/$($env:instance_id)/metadata""#));
    }

    #[test]
    fn test_render_without_user_script() {
        let script = PowerShellShim.render(&params()).unwrap();
        assert!(script.contains(r#"$testscript = """#));
    }

    #[test]
    fn test_render_embeds_user_script() {
        let script = PowerShellShim
            .render(&params().with_user_script("exit 3"))
            .unwrap();

        assert!(script.contains(r#"$testscript = "ZXhpdCAz""#));
        assert!(script.contains("FromBase64String($testscript)"));
    }

    #[test]
    fn test_render_mirrors_transcript_to_serial() {
        let script = PowerShellShim.render(&params()).unwrap();
        assert!(script.contains(r#"$global:serial_device = "COM1""#));
        assert!(script.contains("Start-Transcript"));
    }
}
