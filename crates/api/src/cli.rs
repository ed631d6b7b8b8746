//! Command line: run the server, or perform first-install administration.

use clap::{Args, Parser, Subcommand};

use netdesk_auth::Bootstrap;
use netdesk_core::{DomainResult, OrganizationId};
use netdesk_organizations::{NewOrganization, OrgType};

use crate::app::AppServices;

#[derive(Debug, Parser)]
#[command(name = "netdesk")]
#[command(about = "ISP back-office authorization service", long_about = None)]
pub struct Cli {
    /// Defaults to `serve`.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP API
    Serve,

    /// Register an organization without an acting user (fresh install)
    CreateOrganization(CreateOrganizationArgs),

    /// Create a super-admin account
    CreateSuperAdmin(CreateSuperAdminArgs),
}

#[derive(Debug, Args)]
pub struct CreateOrganizationArgs {
    #[arg(long)]
    pub name: String,
    /// Upper-case letters, digits, `_` and `-`
    #[arg(long)]
    pub code: String,
    #[arg(long, default_value = "isp", value_parser = parse_org_type)]
    pub org_type: OrgType,
    #[arg(long)]
    pub email: String,
    #[arg(long)]
    pub phone: String,
    #[arg(long)]
    pub address: String,
    #[arg(long)]
    pub city: String,
    #[arg(long)]
    pub postal_code: String,
    #[arg(long, default_value = "Bangladesh")]
    pub country: String,
    #[arg(long, default_value = "BDT")]
    pub currency: String,
}

#[derive(Debug, Args)]
pub struct CreateSuperAdminArgs {
    /// Must be unique; there is no fallback to an existing account
    #[arg(long)]
    pub login_id: String,
    #[arg(long)]
    pub email: String,
    #[arg(long)]
    pub name: String,
    #[arg(long, env = "NETDESK_ADMIN_PASSWORD", hide_env_values = true)]
    pub password: String,
    #[arg(long)]
    pub organization_id: OrganizationId,
    /// Skip creating and assigning the `super_admin` role
    #[arg(long)]
    pub no_role: bool,
}

fn parse_org_type(raw: &str) -> Result<OrgType, String> {
    OrgType::parse(raw).map_err(|e| e.to_string())
}

impl From<CreateOrganizationArgs> for NewOrganization {
    fn from(args: CreateOrganizationArgs) -> Self {
        NewOrganization {
            name: args.name,
            code: args.code,
            org_type: args.org_type,
            email: args.email,
            phone: args.phone,
            mobile: None,
            website: None,
            address: args.address,
            city: args.city,
            postal_code: args.postal_code,
            country: args.country,
            trade_license: None,
            tin_number: None,
            registration_number: None,
            currency: args.currency,
            revenue_sharing_enabled: true,
            shares: None,
        }
    }
}

impl From<CreateSuperAdminArgs> for Bootstrap {
    fn from(args: CreateSuperAdminArgs) -> Self {
        Bootstrap {
            login_id: args.login_id,
            email: args.email,
            name: args.name,
            password: args.password,
            organization_id: args.organization_id,
            assign_role: !args.no_role,
        }
    }
}

/// Run an administrative command; `Serve` is handled by the caller.
pub async fn execute_command(command: Command, services: &AppServices) -> DomainResult<()> {
    match command {
        Command::Serve => {}
        Command::CreateOrganization(args) => {
            let org = services.organizations.register(args.into(), None).await?;
            println!("Organization {} created with id {}", org.code, org.id);
        }
        Command::CreateSuperAdmin(args) => {
            let user = services.accounts.bootstrap_super_admin(args.into()).await?;
            println!("Super admin {} created with id {}", user.login_id, user.id);
        }
    }
    Ok(())
}
