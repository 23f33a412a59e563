//! Bash shim for Linux guests

use super::{ShimParams, ShimRenderer};
use crate::TesterError;
use crate::config::ShimType;
use crate::template::render_template;

const TEMPLATE: &str = r#"#!/bin/bash
set -e
SCRIPT='{{ user_script_path }}'
OS_AUTH_TOKEN='{{ auth_token }}'
METADATA_KEY='{{ status_key }}'
METADATA_VALUE_OK='{{ status_ok }}'
METADATA_VALUE_ERR='{{ status_error }}'
METADATA_EXITCODE_KEY='{{ exitcode_key }}'

INSTANCE_ID=$(curl -s http://169.254.169.254/openstack/latest/meta_data.json | $(which python3 || which python) -c 'import sys,json; sys.stdout.write(json.load(sys.stdin)["uuid"])')

set_metadata() {
	key=$1
	val=$2
	url="{{ endpoint }}/servers/$INSTANCE_ID/metadata"
	echo "Reporting: $key -> $val to $url"
	/usr/bin/curl -s -f -X POST \
		"$url" \
		-H "User-Agent: nova-servertester" \
		-H "Content-Type: application/json" \
		-H "Accept: application/json" \
		-H "X-Auth-Token: $OS_AUTH_TOKEN" \
		-d "{\"metadata\": {\"$key\": \"$val\"}}"
}

report() {
	code=$1
	if [ "$code" -eq 0 ]; then
		set_metadata "$METADATA_KEY" "$METADATA_VALUE_OK"
	else
		set_metadata "$METADATA_EXITCODE_KEY" "$code"
		set_metadata "$METADATA_KEY" "$METADATA_VALUE_ERR"
	fi
}

code=0
if [ -f "$SCRIPT" ]; then
	"$SCRIPT" || code=$?
fi
report "$code"
"#;

/// Renders the bash shim
///
/// The user script is expected as a separate executable file at
/// `user_script_path`; the shim skips it when the file is absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct BashShim;

impl ShimRenderer for BashShim {
    fn shim_type(&self) -> ShimType {
        ShimType::Bash
    }

    fn render(&self, params: &ShimParams) -> Result<String, TesterError> {
        render_template("run_test.sh", TEMPLATE, params)
    }
}
