//! Role-dependent configuration collection
//!
//! Makers and voters are asked for block timing and for the address they will
//! use; participants are asked nothing.

use crate::stage::Stage;
use async_trait::async_trait;
use join_types::{
    classify_address, AccountGenerator, Address, AddressChoice, Capability, InputError,
    JoinContext, Prompt, Prompter, ProvisionError, Role,
};
use std::sync::Arc;

const ADDRESS_HELP: &str = "Please enter either: \
    \n1) an address (starting with 0x) \
    \n2) a 1 to generate an address to use \
    \n3) a 0 to not participate in this role";

/// What the configuration stage asks for, fixed by role
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionPlan {
    /// Block timing, then one address per capability in this order
    Timed { capabilities: Vec<Capability> },
    /// Nothing to collect
    Passthrough,
}

impl CollectionPlan {
    pub fn for_role(role: Role) -> Self {
        match role {
            Role::CombinedMakerVoter => Self::Timed {
                capabilities: vec![Capability::Maker, Capability::Voter],
            },
            Role::MakerOnly => Self::Timed {
                capabilities: vec![Capability::Maker],
            },
            Role::VoterOnly => Self::Timed {
                capabilities: vec![Capability::Voter],
            },
            Role::Participant => Self::Passthrough,
        }
    }

    /// Prompts this plan will issue, in order
    pub fn prompts(&self) -> Vec<Prompt> {
        match self {
            Self::Timed { capabilities } => {
                let mut prompts = vec![Prompt::MinBlockInterval, Prompt::MaxBlockInterval];
                prompts.extend(capabilities.iter().copied().map(Prompt::Address));
                prompts
            }
            Self::Passthrough => Vec::new(),
        }
    }
}

/// `collect_configuration` stage
pub struct CollectConfiguration {
    plan: CollectionPlan,
    prompter: Arc<dyn Prompter>,
    accounts: Arc<dyn AccountGenerator>,
}

impl CollectConfiguration {
    pub fn new(
        plan: CollectionPlan,
        prompter: Arc<dyn Prompter>,
        accounts: Arc<dyn AccountGenerator>,
    ) -> Self {
        Self {
            plan,
            prompter,
            accounts,
        }
    }
}

#[async_trait]
impl Stage for CollectConfiguration {
    fn name(&self) -> &'static str {
        "collect_configuration"
    }

    async fn execute(&self, mut ctx: JoinContext) -> Result<JoinContext, ProvisionError> {
        let capabilities = match &self.plan {
            CollectionPlan::Timed { capabilities } => capabilities,
            CollectionPlan::Passthrough => {
                tracing::debug!("{:?} needs no configuration", ctx.role);
                return Ok(ctx);
            }
        };

        self.prompter
            .inform("Please enter the configuration for this network:");
        let min = ask_interval(self.prompter.as_ref(), Prompt::MinBlockInterval).await?;
        let max = ask_interval(self.prompter.as_ref(), Prompt::MaxBlockInterval).await?;
        ctx.set_block_interval(min, max)?;

        for &capability in capabilities {
            let address =
                resolve_address(self.prompter.as_ref(), self.accounts.as_ref(), capability)
                    .await?
                    .ok_or(InputError::MissingAccount(capability))?;

            self.prompter.inform(&format!(
                "Please use {} as your {} address",
                address, capability
            ));
            ctx.set_accounts(capability, vec![address])?;
        }

        tracing::info!(
            "Collected configuration: blocks every {}-{}s, {} accounts",
            min,
            max,
            ctx.all_accounts().len()
        );
        Ok(ctx)
    }
}

/// Ask for one block interval bound
async fn ask_interval(prompter: &dyn Prompter, prompt: Prompt) -> Result<u64, ProvisionError> {
    let answer = prompter.ask(prompt).await?;
    let answer = answer.trim();
    answer.parse::<u64>().map_err(|_| {
        ProvisionError::from(InputError::InvalidInterval {
            field: prompt.label(),
            value: answer.to_string(),
        })
    })
}

/// Ask which address to use for a capability
///
/// `Ok(None)` means the operator declined. A generation request mints exactly
/// one account.
pub async fn resolve_address(
    prompter: &dyn Prompter,
    accounts: &dyn AccountGenerator,
    capability: Capability,
) -> Result<Option<Address>, ProvisionError> {
    prompter.inform(&format!("\nSelect which {} to use", capability));
    prompter.inform(ADDRESS_HELP);

    match classify_address(&prompter.ask(Prompt::Address(capability)).await?) {
        AddressChoice::Literal(address) => Ok(Some(address)),
        AddressChoice::Generate => {
            prompter.inform("generating new address...");
            accounts.new_account().await.map(Some)
        }
        AddressChoice::Decline => Ok(None),
    }
}
