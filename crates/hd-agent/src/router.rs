use hd_core::types::{SupportTeam, TicketCategory};

/// Maps a category to the team that owns it.
///
/// Returning `None` means no team could be resolved; the agent then sends the
/// ticket to review instead of assigning it.
pub trait Router: Send + Sync {
    fn route(&self, category: TicketCategory) -> Option<SupportTeam>;
}

/// Total mapping: every category resolves to a team.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRouter;

impl Router for DefaultRouter {
    fn route(&self, category: TicketCategory) -> Option<SupportTeam> {
        let team = match category {
            TicketCategory::Account => SupportTeam::AccountsTeam,
            TicketCategory::Billing => SupportTeam::BillingTeam,
            TicketCategory::Technical => SupportTeam::TechTeam,
            TicketCategory::Other => SupportTeam::GeneralSupport,
        };
        Some(team)
    }
}
