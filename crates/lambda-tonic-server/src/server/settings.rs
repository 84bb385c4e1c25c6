//! Deployment settings supplied by the environment.
//!
//! These values describe where the function is deployed (project, domain,
//! bucket) and the credentials it was provisioned with. They are read once at
//! startup, either from CLI flags or from the environment variables listed on
//! each field, and are immutable for the lifetime of the process.
//!
//! No field is validated. An unset variable resolves to an empty string and
//! whatever consumes the field decides whether that is a problem.

use clap::Args;
use core::fmt;

/// Service name used for telemetry when `FUNCTION_NAME` is not set.
pub const DEFAULT_SERVICE_NAME: &str = "lambda";

#[derive(Args, Clone, Default, PartialEq, Eq)]
pub struct DeploymentSettings {
    /// Name of the deployed function.
    ///
    /// Environment variable: `FUNCTION_NAME`
    #[arg(long, env = "FUNCTION_NAME", default_value = "")]
    pub func_name: String,

    /// Google Cloud project the function runs in.
    ///
    /// Environment variable: `GOOGLE_PROJECT_ID`
    #[arg(long, env = "GOOGLE_PROJECT_ID", default_value = "")]
    pub project_id: String,

    /// Domain the function is served from.
    ///
    /// Environment variable: `GOOGLE_GCF_DOMAIN`
    #[arg(long, env = "GOOGLE_GCF_DOMAIN", default_value = "")]
    pub domain: String,

    #[command(flatten)]
    pub oauth: OAuthSettings,

    /// Key used to sign and verify JWTs.
    ///
    /// Environment variable: `JWT_SECRET_KEY`
    #[arg(long, env = "JWT_SECRET_KEY", default_value = "", hide_env_values = true)]
    pub jwt_secret: String,

    /// Location of the deployed code.
    ///
    /// Environment variable: `CODE_LOCATION`
    #[arg(long, env = "CODE_LOCATION", default_value = "")]
    pub code_location: String,

    /// Storage bucket backing the function.
    ///
    /// Environment variable: `CLOUD_FUNCTIONS_BUCKET`
    #[arg(long, env = "CLOUD_FUNCTIONS_BUCKET", default_value = "")]
    pub bucket_name: String,
}

/// Google OAuth client credentials.
#[derive(Args, Clone, Default, PartialEq, Eq)]
pub struct OAuthSettings {
    /// Environment variable: `GOOGLE_CLIENT_ID`
    #[arg(long = "google-client-id", env = "GOOGLE_CLIENT_ID", default_value = "")]
    pub client_id: String,

    /// Environment variable: `GOOGLE_CLIENT_SECRET`
    #[arg(
        long = "google-client-secret",
        env = "GOOGLE_CLIENT_SECRET",
        default_value = "",
        hide_env_values = true
    )]
    pub client_secret: String,
}

impl DeploymentSettings {
    /// Name reported to telemetry backends.
    pub fn service_name(&self) -> &str {
        if self.func_name.is_empty() {
            DEFAULT_SERVICE_NAME
        } else {
            &self.func_name
        }
    }
}

/// Prints whether a secret is set without printing the secret.
struct Redacted<'a>(&'a str);

impl fmt::Debug for Redacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("\"\"")
        } else {
            f.write_str("<redacted>")
        }
    }
}

impl fmt::Debug for DeploymentSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeploymentSettings")
            .field("func_name", &self.func_name)
            .field("project_id", &self.project_id)
            .field("domain", &self.domain)
            .field("oauth", &self.oauth)
            .field("jwt_secret", &Redacted(&self.jwt_secret))
            .field("code_location", &self.code_location)
            .field("bucket_name", &self.bucket_name)
            .finish()
    }
}

impl fmt::Debug for OAuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthSettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &Redacted(&self.client_secret))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_name_falls_back_when_unset() {
        let settings = DeploymentSettings::default();
        assert_eq!(settings.service_name(), DEFAULT_SERVICE_NAME);

        let settings = DeploymentSettings {
            func_name: "infer".to_string(),
            ..Default::default()
        };
        assert_eq!(settings.service_name(), "infer");
    }

    #[test]
    fn debug_hides_secrets() {
        let settings = DeploymentSettings {
            func_name: "infer".to_string(),
            jwt_secret: "hunter2".to_string(),
            oauth: OAuthSettings {
                client_id: "client".to_string(),
                client_secret: "s3cr3t".to_string(),
            },
            ..Default::default()
        };

        let printed = format!("{settings:?}");
        assert!(printed.contains("infer"));
        assert!(printed.contains("client"));
        assert!(!printed.contains("hunter2"));
        assert!(!printed.contains("s3cr3t"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn flags_fill_settings_and_rest_stays_empty() {
        #[derive(clap::Parser)]
        struct Harness {
            #[command(flatten)]
            settings: DeploymentSettings,
        }

        let parsed = <Harness as clap::Parser>::try_parse_from([
            "lambda",
            "--project-id",
            "proj",
            "--google-client-secret",
            "s3cr3t",
        ])
        .unwrap();

        assert_eq!(parsed.settings.project_id, "proj");
        assert_eq!(parsed.settings.oauth.client_secret, "s3cr3t");
        assert_eq!(parsed.settings.domain, "");
        assert_eq!(parsed.settings.code_location, "");
    }

    #[test]
    fn debug_shows_unset_secret_as_empty() {
        let printed = format!("{:?}", DeploymentSettings::default());
        assert!(!printed.contains("<redacted>"));
    }
}
