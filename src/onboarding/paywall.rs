//! Paywall sub-flow: purchase, then forced sign-in for users who skipped it.

use crate::persisted::string_enum;

string_enum! {
    pub enum PaywallStage {
        ShowingPaywall => "showing_paywall",
        /// Sign-in required before finishing; offers no skip.
        ShowingForcedAuth => "showing_forced_auth",
        /// All requirements met; the phase may advance.
        Completing => "completing",
    }
}

/// State of the paywall phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaywallFlow {
    stage: PaywallStage,
    skipped_early_auth: bool,
    purchased: bool,
    declined_count: u32,
}

impl PaywallFlow {
    pub fn new(skipped_early_auth: bool) -> Self {
        Self {
            stage: PaywallStage::ShowingPaywall,
            skipped_early_auth,
            purchased: false,
            declined_count: 0,
        }
    }

    pub fn stage(&self) -> PaywallStage {
        self.stage
    }

    pub fn purchased(&self) -> bool {
        self.purchased
    }

    /// How many times the purchase was declined and the paywall re-presented.
    pub fn declined_count(&self) -> u32 {
        self.declined_count
    }

    pub fn needs_forced_auth(&self, is_authenticated: bool) -> bool {
        self.skipped_early_auth && !is_authenticated
    }

    /// Apply the purchase result.
    ///
    /// A declined purchase keeps the paywall up unless `allow_bypass` is set.
    pub fn on_purchase_result(
        &mut self,
        purchased: bool,
        is_authenticated: bool,
        allow_bypass: bool,
    ) -> PaywallStage {
        if self.stage != PaywallStage::ShowingPaywall {
            return self.stage;
        }
        if !purchased && !allow_bypass {
            self.declined_count += 1;
            return self.stage;
        }
        self.purchased = purchased;
        self.stage = if self.needs_forced_auth(is_authenticated) {
            PaywallStage::ShowingForcedAuth
        } else {
            PaywallStage::Completing
        };
        self.stage
    }

    /// Sign-in finished during forced auth.
    pub fn on_auth_complete(&mut self) -> PaywallStage {
        if self.stage == PaywallStage::ShowingForcedAuth {
            self.stage = PaywallStage::Completing;
        }
        self.stage
    }

    pub fn is_completing(&self) -> bool {
        self.stage == PaywallStage::Completing
    }
}
