#![allow(dead_code)]

//! Ledger invariant helpers shared by the test suites.

use std::collections::HashSet;

use sqlx::SqlitePool;

use crate::db;
use crate::models::{Campaign, CampaignStatus, Donation, DonationStatus};

/// INV-1: `current_amount_cents` must never be negative.
pub fn assert_current_amount_non_negative(campaign: &Campaign) {
    assert!(
        campaign.current_amount_cents >= 0,
        "INV-1 violated: campaign {} has negative current amount ({})",
        campaign.id,
        campaign.current_amount_cents
    );
}

/// INV-2: campaign goal must always be positive.
pub fn assert_goal_positive(campaign: &Campaign) {
    assert!(
        campaign.goal_amount_cents > 0,
        "INV-2 violated: campaign {} has non-positive goal ({})",
        campaign.id,
        campaign.goal_amount_cents
    );
}

/// INV-3: `donors_count` can never exceed `donations_count`.
pub fn assert_donor_count_bounded(campaign: &Campaign) {
    assert!(
        campaign.donors_count <= campaign.donations_count,
        "INV-3 violated: campaign {} counts {} donors over {} donations",
        campaign.id,
        campaign.donors_count,
        campaign.donations_count
    );
}

/// INV-4: a `completed` campaign has reached its goal and carries a
/// completion instant.
pub fn assert_completed_closed_consistently(campaign: &Campaign) {
    if campaign.status == CampaignStatus::Completed {
        assert!(
            campaign.current_amount_cents >= campaign.goal_amount_cents,
            "INV-4 violated: campaign {} is completed below its goal",
            campaign.id
        );
        assert!(
            campaign.completed_at.is_some(),
            "INV-4 violated: campaign {} is completed without completed_at",
            campaign.id
        );
    }
}

/// INV-5: a donation row is internally consistent with its status: positive
/// amount, a `TXN_` internal identifier, a gateway identifier and completion
/// instant iff completed, and no completion instant when failed.
pub fn assert_donation_well_formed(donation: &Donation) {
    assert!(
        donation.amount_cents > 0,
        "INV-5 violated: donation {} has non-positive amount ({})",
        donation.id,
        donation.amount_cents
    );
    assert!(
        donation.transaction_id.starts_with("TXN_"),
        "INV-5 violated: donation {} transaction id {:?} lacks the TXN_ prefix",
        donation.id,
        donation.transaction_id
    );
    match donation.status {
        DonationStatus::Completed => {
            assert!(
                donation.gateway_transaction_id.is_some(),
                "INV-5 violated: completed donation {} has no gateway id",
                donation.id
            );
            assert!(
                donation.completed_at.is_some(),
                "INV-5 violated: completed donation {} has no completed_at",
                donation.id
            );
        }
        DonationStatus::Failed | DonationStatus::Pending => {
            assert!(
                donation.completed_at.is_none(),
                "INV-5 violated: {} donation {} carries completed_at",
                donation.status.as_str(),
                donation.id
            );
        }
        DonationStatus::Refunded => {}
    }
}

/// INV-6: aggregate counters only grow.
pub fn assert_counters_monotonic(before: &Campaign, after: &Campaign) {
    assert!(
        after.current_amount_cents >= before.current_amount_cents,
        "INV-6 violated: current amount decreased from {} to {}",
        before.current_amount_cents,
        after.current_amount_cents
    );
    assert!(
        after.donations_count >= before.donations_count,
        "INV-6 violated: donations_count decreased from {} to {}",
        before.donations_count,
        after.donations_count
    );
    assert!(
        after.donors_count >= before.donors_count,
        "INV-6 violated: donors_count decreased from {} to {}",
        before.donors_count,
        after.donors_count
    );
}

/// Run all stateless campaign invariants.
pub fn assert_all_campaign_invariants(campaign: &Campaign) {
    assert_current_amount_non_negative(campaign);
    assert_goal_positive(campaign);
    assert_donor_count_bounded(campaign);
    assert_completed_closed_consistently(campaign);
}

/// INV-7: the stored aggregates equal what the donation rows imply —
/// `current_amount_cents` is the sum of completed amounts, `donations_count`
/// the number of completed rows, `donors_count` the number of distinct
/// donors among them.
pub async fn assert_campaign_ledger_consistent(pool: &SqlitePool, campaign_id: i64) {
    let campaign = db::get_campaign(pool, campaign_id)
        .await
        .unwrap()
        .expect("campaign exists");
    let completed = db::list_completed_donations_for_campaign(pool, campaign_id)
        .await
        .unwrap();

    let sum: i64 = completed.iter().map(|d| d.amount_cents).sum();
    assert_eq!(
        campaign.current_amount_cents, sum,
        "INV-7 violated: campaign {} current amount {} != completed sum {}",
        campaign.id, campaign.current_amount_cents, sum
    );
    assert_eq!(
        campaign.donations_count,
        completed.len() as i64,
        "INV-7 violated: campaign {} donations_count {} != completed rows {}",
        campaign.id,
        campaign.donations_count,
        completed.len()
    );
    let distinct: HashSet<i64> = completed.iter().map(|d| d.donor_id).collect();
    assert_eq!(
        campaign.donors_count,
        distinct.len() as i64,
        "INV-7 violated: campaign {} donors_count {} != distinct donors {}",
        campaign.id,
        campaign.donors_count,
        distinct.len()
    );

    for donation in &completed {
        assert_donation_well_formed(donation);
    }
    assert_all_campaign_invariants(&campaign);
}
