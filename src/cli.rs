use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "entitlements")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Manage which applications each tenant is entitled to", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (defaults to ~/.config/entitlements/config.toml)
    #[arg(long, global = true, env = "ENTITLEMENTS_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Entitle a tenant to applications and their modules
    Entitle(ChangeArgs),

    /// Revoke applications from a tenant
    Revoke(ChangeArgs),

    /// Upgrade entitled applications to newer versions
    Upgrade(ChangeArgs),

    /// Bring a tenant to exactly the given set of applications
    Sync(SyncArgs),

    /// Show what a sync would change
    Plan(PlanArgs),

    /// Run a single validator against a request
    Validate(ValidateArgs),

    /// Inspect recorded flows
    #[command(subcommand)]
    Flows(FlowsCommand),

    /// Inspect tenant entitlements
    #[command(subcommand)]
    Entitlements(EntitlementsCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Entitlement changes
// ============================================================================

#[derive(Args)]
pub struct ChangeArgs {
    /// Tenant to change
    #[arg(short, long)]
    pub tenant: String,

    /// Keep going after a failed application instead of rolling back
    #[arg(long)]
    pub ignore_errors: bool,

    /// Return the flow id without waiting for completion
    #[arg(long = "async")]
    pub run_async: bool,

    /// Remove module data when revoking
    #[arg(long)]
    pub purge: bool,

    /// Application ids (`name-version`)
    #[arg(required = true)]
    pub applications: Vec<String>,
}

#[derive(Args)]
pub struct SyncArgs {
    /// Tenant to synchronize
    #[arg(short, long)]
    pub tenant: String,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Show the plan without running it
    #[arg(short, long)]
    pub dry_run: bool,

    /// Keep going after a failed application instead of rolling back
    #[arg(long)]
    pub ignore_errors: bool,

    /// Remove module data of revoked applications
    #[arg(long)]
    pub purge: bool,

    /// Desired application ids; none revokes everything
    pub applications: Vec<String>,
}

#[derive(Args)]
pub struct PlanArgs {
    /// Tenant to plan for
    #[arg(short, long)]
    pub tenant: String,

    /// Desired application ids
    pub applications: Vec<String>,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Tenant the request is for
    #[arg(short, long)]
    pub tenant: String,

    /// Validator to run: dependency or interface-integrity
    #[arg(long)]
    pub validator: String,

    /// Request type: ENTITLE, REVOKE, UPGRADE or STATE
    #[arg(long = "type", default_value = "ENTITLE")]
    pub entitlement_type: String,

    /// Application ids (`name-version`)
    #[arg(required = true)]
    pub applications: Vec<String>,
}

// ============================================================================
// Queries
// ============================================================================

#[derive(Subcommand)]
pub enum FlowsCommand {
    /// Show one flow with its application flows
    Show {
        /// Flow id
        id: String,

        /// Include stages
        #[arg(short, long)]
        stages: bool,
    },

    /// List recent flows of a tenant
    List {
        /// Tenant id
        #[arg(short, long)]
        tenant: String,

        /// Only application flows of this application id
        #[arg(short, long)]
        app: Option<String>,

        /// Maximum number of flows
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show one application flow
    App {
        /// Application flow id
        id: String,

        /// Include stages
        #[arg(short, long)]
        stages: bool,
    },
}

#[derive(Subcommand)]
pub enum EntitlementsCommand {
    /// List the applications a tenant is entitled to
    List {
        /// Tenant id
        #[arg(short, long)]
        tenant: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_entitle() {
        let cli = Cli::parse_from([
            "entitlements",
            "-vv",
            "entitle",
            "--tenant",
            "diku",
            "--async",
            "app-a-1.0.0",
            "app-b-1.0.0",
        ]);
        assert_eq!(cli.verbose, 2);
        let Command::Entitle(args) = cli.command else {
            panic!("expected entitle");
        };
        assert_eq!(args.tenant, "diku");
        assert!(args.run_async);
        assert!(!args.ignore_errors);
        assert_eq!(args.applications, vec!["app-a-1.0.0", "app-b-1.0.0"]);
    }

    #[test]
    fn test_sync_allows_empty_set() {
        let cli = Cli::parse_from(["entitlements", "sync", "-t", "diku", "--yes"]);
        let Command::Sync(args) = cli.command else {
            panic!("expected sync");
        };
        assert!(args.applications.is_empty());
        assert!(args.yes);
    }
}
