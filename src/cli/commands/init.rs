//! Init command implementation
//!
//! This module implements the `init` command for generating a sample
//! configuration file.

use clap::Args;
use std::fs;
use std::path::Path;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path where to create the configuration file
    #[arg(short, long, default_value = "hcimport.toml")]
    pub output: String,

    /// Include example values and comments
    #[arg(long)]
    pub with_examples: bool,

    /// Overwrite existing file
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    /// Execute the init command
    pub async fn execute(&self) -> anyhow::Result<i32> {
        tracing::info!(output = %self.output, "Initializing configuration file");

        println!("📝 Initializing hcimport configuration");
        println!();

        if Path::new(&self.output).exists() && !self.force {
            println!("❌ Configuration file already exists: {}", self.output);
            println!("   Use --force to overwrite");
            return Ok(2);
        }

        let config_content = if self.with_examples {
            Self::generate_config_with_examples()
        } else {
            Self::generate_minimal_config()
        };

        match fs::write(&self.output, config_content) {
            Ok(_) => {
                println!("✅ Configuration file created: {}", self.output);
                println!();
                println!("Next steps:");
                println!("  1. Edit {} with your dataset and project", self.output);
                println!("  2. Create a .env file with your credentials:");
                println!("     - Set HCIMPORT_PLATFORM_API_KEY");
                println!("     - Set HCIMPORT_AUTH_TOKEN_ID (or configure healthcare.access_token)");
                println!("  3. Validate configuration: hcimport validate-config");
                println!("  4. Run an import: hcimport import refs.json");
                println!();
                Ok(0)
            }
            Err(e) => {
                println!("❌ Failed to write configuration file");
                println!("   Error: {}", e);
                Ok(5)
            }
        }
    }

    /// Generate minimal configuration
    fn generate_minimal_config() -> String {
        r#"# hcimport Configuration File
# Healthcare store to research platform importer

[application]
log_level = "info"

[healthcare]
base_url = "https://healthcare.googleapis.com/v1"
dataset = "projects/my-project/locations/us-central1/datasets/clinical"
dicom_store = "imaging"
hl7_store = "messages"
fhir_store = "resources"
auth_token_id = "${HCIMPORT_AUTH_TOKEN_ID}"

[platform]
base_url = "https://platform.example.com"
api_key = "${HCIMPORT_PLATFORM_API_KEY}"
project_id = "your-project-id"

[import]
merge_policy = "preserve_existing"

[logging]
local_enabled = false
local_path = "/var/log/hcimport"
local_rotation = "daily"
"#
        .to_string()
    }

    /// Generate configuration with examples and comments
    fn generate_config_with_examples() -> String {
        r#"# hcimport Configuration File
# Imports DICOM series, HL7v2 messages and FHIR resources from a healthcare
# data store into a project/subject/session/acquisition hierarchy.
#
# Values of the form ${VAR} are replaced from the environment (a .env file
# is loaded at startup). Any key can also be overridden with
# HCIMPORT_<SECTION>_<KEY>, e.g. HCIMPORT_PLATFORM_PROJECT_ID.

[application]
# Log level: trace | debug | info | warn | error
log_level = "info"

[healthcare]
# Healthcare API root and dataset resource path
base_url = "https://healthcare.googleapis.com/v1"
dataset = "projects/my-project/locations/us-central1/datasets/clinical"

# Store names inside the dataset; only the stores you import from are needed
dicom_store = "imaging"
hl7_store = "messages"
fhir_store = "resources"

# Either a bearer token...
# access_token = "${HCIMPORT_HEALTHCARE_TOKEN}"
# ...or the id of a platform-held token exchanged at startup
auth_token_id = "${HCIMPORT_AUTH_TOKEN_ID}"

timeout_seconds = 60

[healthcare.retry]
# Retries are off unless configured; only connection errors, timeouts
# and 5xx responses are retried
max_retries = 0
initial_delay_ms = 1000
max_delay_ms = 30000
backoff_multiplier = 2.0

[platform]
base_url = "https://platform.example.com"
api_key = "${HCIMPORT_PLATFORM_API_KEY}"
project_id = "your-project-id"
timeout_seconds = 60

# When a create races with another importer:
#   fail     - record the item as failed
#   relookup - look the node up again and reuse the other importer's node
on_conflict = "fail"
conflict_relookups = 1

[platform.retry]
max_retries = 0

[identity]
# Master code service; defaults to platform.base_url
# base_url = "https://identity.example.com"
timeout_seconds = 60

[import]
# Omit patient names from imaging metadata
de_identify = false

# Imaging attribute used as the subject code: patient_id | accession_number
subject_code_field = "patient_id"

# Repeated imports of a known subject:
#   preserve_existing     - established fields win, fresh values fill gaps
#   overwrite_with_latest - fresh values replace stored ones
merge_policy = "preserve_existing"

# CSV with LOINC_NUM and SHORTNAME columns for observation short names
# code_table = "/etc/hcimport/loinc.csv"

# Timezone label recorded with imaging timestamps
timezone = "UTC"

# Parent directory for per-series scratch space (system temp by default)
# work_dir = "/var/tmp/hcimport"

[logging]
# JSON log file in addition to console output
local_enabled = false
local_path = "/var/log/hcimport"
local_rotation = "daily"  # daily | hourly
"#
        .to_string()
    }
}
