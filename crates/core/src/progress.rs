//! Learning-progress state machine.
//!
//! One [`LearningProgress`] exists per `(user, course)` pair. Modules unlock
//! strictly in order: module `n + 1` becomes available only once module `n`
//! is complete. Every mutation keeps `completed_modules` equal to the number
//! of completed modules and bumps `version`, which storage uses for
//! compare-and-swap updates.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::error::ProgressError;

/// Progress of a single course module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleProgress {
    /// 1-based module id.
    pub module_id: u32,
    /// Whether the module is complete.
    pub completed: bool,
    /// Whether the module is still locked.
    pub is_locked: bool,
    /// When the module was unlocked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    /// When the module was completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    /// DataCoins claimed for this module (whole tokens).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward_earned: Option<u64>,
    /// Mint transaction of the module reward.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
}

impl ModuleProgress {
    fn new(module_id: u32, unlocked_at: Option<i64>) -> Self {
        Self {
            module_id,
            completed: false,
            is_locked: unlocked_at.is_none(),
            started_at: unlocked_at,
            completed_at: None,
            reward_earned: None,
            transaction_hash: None,
        }
    }
}

/// A learner's submission for a course assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentSubmission {
    /// Assignment id from the course definition.
    pub assignment_id: String,
    /// Always true once present; kept for the dashboard.
    pub is_submitted: bool,
    /// Submission time.
    pub submitted_at: i64,
    /// Link to the submitted work.
    pub submission_url: String,
    /// Whether a reviewer accepted it.
    pub is_verified: bool,
    /// Review time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<i64>,
    /// Reviewer identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_by: Option<String>,
    /// Reviewer feedback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

/// Per-user, per-course learning record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningProgress {
    /// Learner wallet.
    pub user_address: Address,
    /// Course id.
    pub course_id: u64,
    /// Staked amount in ETH (decimal string).
    pub stake_amount: String,
    /// Whether the learner staked on-chain.
    pub is_staked: bool,
    /// Stake time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staked_at: Option<i64>,
    /// Ordered module progress.
    pub modules: Vec<ModuleProgress>,
    /// Assignment submissions.
    #[serde(default)]
    pub assignments: Vec<AssignmentSubmission>,
    /// Number of completed modules.
    pub completed_modules: u32,
    /// First module that is unlocked but not complete (last module once done).
    pub current_module_id: u32,
    /// Whether the course was marked complete.
    pub course_completed: bool,
    /// Completion time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    /// Certificate CID pinned on completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_cid: Option<String>,
    /// Whether the difficulty-based completion reward was paid.
    #[serde(default)]
    pub completion_reward_claimed: bool,
    /// Whether the stake was refunded.
    pub is_stake_returned: bool,
    /// Refund time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stake_returned_at: Option<i64>,
    /// Last mutation driven by the learner.
    pub last_activity_at: i64,
    /// Creation time.
    pub created_at: i64,
    /// Optimistic concurrency version.
    pub version: i64,
}

impl LearningProgress {
    /// Start a progress record with only the first module unlocked.
    pub fn enroll(
        user_address: Address,
        course_id: u64,
        stake_amount: impl Into<String>,
        is_staked: bool,
        total_modules: u32,
        now: i64,
    ) -> Result<Self, ProgressError> {
        if total_modules == 0 {
            return Err(ProgressError::NoModules);
        }

        let modules = (1..=total_modules)
            .map(|id| ModuleProgress::new(id, (id == 1).then_some(now)))
            .collect();

        Ok(Self {
            user_address,
            course_id,
            stake_amount: stake_amount.into(),
            is_staked,
            staked_at: is_staked.then_some(now),
            modules,
            assignments: Vec::new(),
            completed_modules: 0,
            current_module_id: 1,
            course_completed: false,
            completed_at: None,
            certificate_cid: None,
            completion_reward_claimed: false,
            is_stake_returned: false,
            stake_returned_at: None,
            last_activity_at: now,
            created_at: now,
            version: 0,
        })
    }

    /// Record an on-chain stake on a record created before enrollment.
    /// Module progress is kept.
    pub fn record_stake(
        &mut self,
        stake_amount: impl Into<String>,
        now: i64,
    ) -> Result<(), ProgressError> {
        if self.is_staked {
            return Err(ProgressError::AlreadyStaked);
        }
        self.is_staked = true;
        self.stake_amount = stake_amount.into();
        self.staked_at = Some(now);
        self.touch(now);
        Ok(())
    }

    /// Number of modules in the course.
    pub fn total_modules(&self) -> u32 {
        self.modules.len() as u32
    }

    /// Completion percentage, floored.
    pub fn percentage(&self) -> u32 {
        let total = self.total_modules();
        if total == 0 {
            return 0;
        }
        self.completed_modules * 100 / total
    }

    /// Look up a module.
    pub fn module(&self, module_id: u32) -> Option<&ModuleProgress> {
        self.modules.iter().find(|m| m.module_id == module_id)
    }

    /// Whether the module exists and is unlocked.
    pub fn is_module_unlocked(&self, module_id: u32) -> bool {
        self.module(module_id).is_some_and(|m| !m.is_locked)
    }

    /// Whether every module is complete.
    pub fn all_modules_completed(&self) -> bool {
        self.modules.iter().all(|m| m.completed)
    }

    fn module_index(&self, module_id: u32) -> Result<usize, ProgressError> {
        self.modules
            .iter()
            .position(|m| m.module_id == module_id)
            .ok_or(ProgressError::ModuleNotFound(module_id))
    }

    fn touch(&mut self, now: i64) {
        self.last_activity_at = now;
        self.version += 1;
    }

    fn refresh_counters(&mut self) {
        self.completed_modules = self.modules.iter().filter(|m| m.completed).count() as u32;
        self.current_module_id = self
            .modules
            .iter()
            .find(|m| !m.completed && !m.is_locked)
            .or_else(|| self.modules.last())
            .map(|m| m.module_id)
            .unwrap_or(1);
    }

    /// Complete an unlocked module and unlock its successor.
    pub fn complete_module(&mut self, module_id: u32, now: i64) -> Result<(), ProgressError> {
        let idx = self.module_index(module_id)?;
        let module = &self.modules[idx];
        if module.is_locked {
            return Err(ProgressError::ModuleLocked(module_id));
        }
        if module.completed {
            return Err(ProgressError::ModuleAlreadyCompleted(module_id));
        }

        let module = &mut self.modules[idx];
        module.completed = true;
        module.completed_at = Some(now);

        if let Some(next) = self.modules.get_mut(idx + 1) {
            if next.is_locked {
                next.is_locked = false;
                next.started_at = Some(now);
            }
        }

        self.refresh_counters();
        self.touch(now);
        Ok(())
    }

    /// Reserve the reward for a module, completing it first if needed.
    ///
    /// Returns true when this call completed the module. The claim is
    /// settled with [`Self::settle_module_reward`] once the mint succeeds or
    /// released with [`Self::release_module_reward`] when it fails.
    pub fn claim_module_reward(
        &mut self,
        module_id: u32,
        amount: u64,
        now: i64,
    ) -> Result<bool, ProgressError> {
        let idx = self.module_index(module_id)?;
        if self.modules[idx].reward_earned.is_some() {
            return Err(ProgressError::RewardAlreadyClaimed(module_id));
        }

        let completed_now = if self.modules[idx].completed {
            false
        } else {
            self.complete_module(module_id, now)?;
            true
        };

        self.modules[idx].reward_earned = Some(amount);
        if !completed_now {
            self.touch(now);
        }
        Ok(completed_now)
    }

    /// Attach the mint transaction to a claimed module reward.
    pub fn settle_module_reward(
        &mut self,
        module_id: u32,
        tx_hash: impl Into<String>,
        now: i64,
    ) -> Result<(), ProgressError> {
        let idx = self.module_index(module_id)?;
        let module = &mut self.modules[idx];
        if module.reward_earned.is_none() {
            return Err(ProgressError::RewardNotClaimed(module_id));
        }
        module.transaction_hash = Some(tx_hash.into());
        self.touch(now);
        Ok(())
    }

    /// Drop an unsettled reward claim. Module completion is kept.
    pub fn release_module_reward(&mut self, module_id: u32, now: i64) -> Result<(), ProgressError> {
        let idx = self.module_index(module_id)?;
        let module = &mut self.modules[idx];
        if module.reward_earned.is_none() || module.transaction_hash.is_some() {
            return Err(ProgressError::RewardNotClaimed(module_id));
        }
        module.reward_earned = None;
        self.touch(now);
        Ok(())
    }

    /// Record an assignment submission, replacing any earlier one.
    pub fn submit_assignment(
        &mut self,
        assignment_id: impl Into<String>,
        submission_url: impl Into<String>,
        now: i64,
    ) {
        let assignment_id = assignment_id.into();
        self.assignments.retain(|a| a.assignment_id != assignment_id);
        self.assignments.push(AssignmentSubmission {
            assignment_id,
            is_submitted: true,
            submitted_at: now,
            submission_url: submission_url.into(),
            is_verified: false,
            verified_at: None,
            verified_by: None,
            feedback: None,
        });
        self.touch(now);
    }

    /// Accept a submitted assignment.
    pub fn verify_assignment(
        &mut self,
        assignment_id: &str,
        verified_by: impl Into<String>,
        feedback: Option<String>,
        now: i64,
    ) -> Result<(), ProgressError> {
        let submission = self
            .assignments
            .iter_mut()
            .find(|a| a.assignment_id == assignment_id)
            .ok_or_else(|| ProgressError::AssignmentNotSubmitted(assignment_id.to_string()))?;

        submission.is_verified = true;
        submission.verified_at = Some(now);
        submission.verified_by = Some(verified_by.into());
        submission.feedback = feedback;
        self.touch(now);
        Ok(())
    }

    /// Number of verified assignments.
    pub fn verified_assignments(&self) -> usize {
        self.assignments.iter().filter(|a| a.is_verified).count()
    }

    /// Mark the course complete once every module is done.
    pub fn mark_course_completed(
        &mut self,
        certificate_cid: Option<String>,
        now: i64,
    ) -> Result<(), ProgressError> {
        if self.course_completed {
            return Err(ProgressError::CourseAlreadyCompleted);
        }
        if !self.all_modules_completed() {
            return Err(ProgressError::ModulesIncomplete {
                completed: self.completed_modules,
                total: self.total_modules(),
            });
        }

        self.course_completed = true;
        self.completed_at = Some(now);
        self.certificate_cid = certificate_cid;
        self.touch(now);
        Ok(())
    }

    /// Record the stake refund that follows course completion.
    pub fn mark_stake_returned(&mut self, now: i64) -> Result<(), ProgressError> {
        if !self.is_staked {
            return Err(ProgressError::NotStaked);
        }
        if !self.course_completed {
            return Err(ProgressError::CourseNotCompleted);
        }
        if self.is_stake_returned {
            return Err(ProgressError::StakeAlreadyReturned);
        }
        self.is_stake_returned = true;
        self.stake_returned_at = Some(now);
        self.touch(now);
        Ok(())
    }

    /// Reserve the difficulty reward of a completed course. Paid once;
    /// [`Self::release_completion_reward`] undoes a reservation whose mint
    /// failed.
    pub fn claim_completion_reward(&mut self, now: i64) -> Result<(), ProgressError> {
        if !self.course_completed {
            return Err(ProgressError::CourseNotCompleted);
        }
        if self.completion_reward_claimed {
            return Err(ProgressError::CompletionRewardClaimed);
        }
        self.completion_reward_claimed = true;
        self.touch(now);
        Ok(())
    }

    /// Drop a completion reward reservation.
    pub fn release_completion_reward(&mut self, now: i64) {
        self.completion_reward_claimed = false;
        self.touch(now);
    }

    /// Reward-progress projection served to the dashboard. Every module is
    /// listed, incomplete ones with `completed: false`.
    pub fn course_view(&self) -> CourseProgressView {
        CourseProgressView {
            course_id: self.course_id,
            total_modules: self.total_modules(),
            completed_modules: self.completed_modules,
            progress_percentage: self.percentage(),
            modules: self
                .modules
                .iter()
                .map(|m| ModuleRewardView {
                    course_id: self.course_id,
                    module_id: m.module_id,
                    completed: m.completed,
                    completed_at: m.completed_at,
                    reward_earned: m.reward_earned,
                    transaction_hash: m.transaction_hash.clone(),
                })
                .collect(),
        }
    }
}

/// Module entry of a [`CourseProgressView`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleRewardView {
    /// Course id.
    pub course_id: u64,
    /// Module id.
    pub module_id: u32,
    /// Whether the module is complete.
    pub completed: bool,
    /// Completion time.
    pub completed_at: Option<i64>,
    /// DataCoins earned.
    pub reward_earned: Option<u64>,
    /// Mint transaction.
    pub transaction_hash: Option<String>,
}

/// Course progress summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseProgressView {
    /// Course id.
    pub course_id: u64,
    /// Module count.
    pub total_modules: u32,
    /// Completed module count.
    pub completed_modules: u32,
    /// `floor(100 * completed / total)`.
    pub progress_percentage: u32,
    /// Every module in course order.
    pub modules: Vec<ModuleRewardView>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn learner() -> Address {
        Address::repeat_byte(0x11)
    }

    fn enrolled(total: u32) -> LearningProgress {
        LearningProgress::enroll(learner(), 7, "0.01", true, total, 1_000).unwrap()
    }

    #[test]
    fn test_enroll_unlocks_first_module_only() {
        let p = enrolled(3);
        assert_eq!(p.total_modules(), 3);
        assert!(p.is_module_unlocked(1));
        assert!(!p.is_module_unlocked(2));
        assert!(!p.is_module_unlocked(3));
        assert!(!p.is_module_unlocked(4));
        assert_eq!(p.current_module_id, 1);
        assert_eq!(p.staked_at, Some(1_000));
        assert_eq!(p.version, 0);

        assert_eq!(
            LearningProgress::enroll(learner(), 1, "0", false, 0, 0),
            Err(ProgressError::NoModules)
        );
    }

    #[test]
    fn test_sequential_unlock() {
        let mut p = enrolled(3);

        assert_eq!(p.complete_module(2, 1_001), Err(ProgressError::ModuleLocked(2)));
        assert_eq!(p.complete_module(9, 1_001), Err(ProgressError::ModuleNotFound(9)));

        p.complete_module(1, 1_002).unwrap();
        assert!(p.is_module_unlocked(2));
        assert!(!p.is_module_unlocked(3));
        assert_eq!(p.completed_modules, 1);
        assert_eq!(p.current_module_id, 2);
        assert_eq!(p.percentage(), 33);
        assert_eq!(p.module(2).unwrap().started_at, Some(1_002));

        assert_eq!(
            p.complete_module(1, 1_003),
            Err(ProgressError::ModuleAlreadyCompleted(1))
        );

        p.complete_module(2, 1_004).unwrap();
        p.complete_module(3, 1_005).unwrap();
        assert_eq!(p.completed_modules, 3);
        assert_eq!(p.percentage(), 100);
        assert_eq!(p.current_module_id, 3);
        assert!(p.all_modules_completed());
        assert_eq!(p.version, 3);
        assert_eq!(p.last_activity_at, 1_005);
    }

    #[test]
    fn test_reward_claim_lifecycle() {
        let mut p = enrolled(2);

        assert!(p.claim_module_reward(1, 3, 10).unwrap());
        assert_eq!(p.completed_modules, 1);
        assert_eq!(
            p.claim_module_reward(1, 3, 11),
            Err(ProgressError::RewardAlreadyClaimed(1))
        );

        p.settle_module_reward(1, "0xabc", 12).unwrap();
        let view = p.course_view();
        assert_eq!(view.completed_modules, 1);
        assert_eq!(view.progress_percentage, 50);
        assert_eq!(view.modules.len(), 2);
        assert_eq!(view.modules[0].transaction_hash.as_deref(), Some("0xabc"));
        assert_eq!(view.modules[0].reward_earned, Some(3));
        assert!(!view.modules[1].completed);

        // Locked modules cannot be claimed
        let mut q = enrolled(2);
        assert_eq!(q.claim_module_reward(2, 3, 10), Err(ProgressError::ModuleLocked(2)));
    }

    #[test]
    fn test_reward_claim_on_completed_module() {
        let mut p = enrolled(2);
        p.complete_module(1, 10).unwrap();
        assert!(!p.claim_module_reward(1, 3, 11).unwrap());

        p.release_module_reward(1, 12).unwrap();
        assert_eq!(p.module(1).unwrap().reward_earned, None);
        assert!(p.module(1).unwrap().completed);
        assert_eq!(
            p.release_module_reward(1, 13),
            Err(ProgressError::RewardNotClaimed(1))
        );
        assert_eq!(
            p.settle_module_reward(1, "0x1", 14),
            Err(ProgressError::RewardNotClaimed(1))
        );
    }

    #[test]
    fn test_assignments() {
        let mut p = enrolled(1);
        assert_eq!(
            p.verify_assignment("a1", "admin", None, 5),
            Err(ProgressError::AssignmentNotSubmitted("a1".to_string()))
        );

        p.submit_assignment("a1", "https://github.com/u/r", 5);
        p.verify_assignment("a1", "admin", Some("nice".to_string()), 6)
            .unwrap();
        assert_eq!(p.verified_assignments(), 1);

        // Resubmission replaces the earlier entry and resets review
        p.submit_assignment("a1", "https://github.com/u/r2", 7);
        assert_eq!(p.assignments.len(), 1);
        assert_eq!(p.assignments[0].submission_url, "https://github.com/u/r2");
        assert!(!p.assignments[0].is_verified);
        assert_eq!(p.verified_assignments(), 0);
    }

    #[test]
    fn test_course_completion_and_refund() {
        let mut p = enrolled(2);
        assert_eq!(p.mark_stake_returned(1), Err(ProgressError::CourseNotCompleted));
        assert_eq!(
            p.mark_course_completed(None, 1),
            Err(ProgressError::ModulesIncomplete {
                completed: 0,
                total: 2
            })
        );

        p.complete_module(1, 2).unwrap();
        p.complete_module(2, 3).unwrap();
        p.mark_course_completed(Some("bafycid".to_string()), 4)
            .unwrap();
        assert!(p.course_completed);
        assert_eq!(p.certificate_cid.as_deref(), Some("bafycid"));
        assert_eq!(
            p.mark_course_completed(None, 5),
            Err(ProgressError::CourseAlreadyCompleted)
        );

        p.mark_stake_returned(6).unwrap();
        assert!(p.is_stake_returned);
        assert_eq!(p.mark_stake_returned(7), Err(ProgressError::StakeAlreadyReturned));
    }

    #[test]
    fn test_course_view_lists_every_module() {
        let p = LearningProgress::enroll(learner(), 3, "0", false, 4, 10).unwrap();
        let view = p.course_view();
        assert_eq!(view.modules.len() as u32, view.total_modules);
        assert!(view.modules.iter().all(|m| !m.completed && m.reward_earned.is_none()));
        assert_eq!(
            view.modules.iter().map(|m| m.module_id).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
    }

    #[test]
    fn test_record_stake_upgrades_unstaked_record() {
        let mut p = LearningProgress::enroll(learner(), 3, "0", false, 2, 10).unwrap();
        p.complete_module(1, 11).unwrap();

        p.record_stake("0.002", 20).unwrap();
        assert!(p.is_staked);
        assert_eq!(p.stake_amount, "0.002");
        assert_eq!(p.staked_at, Some(20));
        assert_eq!(p.completed_modules, 1);
        assert_eq!(p.record_stake("0.002", 21), Err(ProgressError::AlreadyStaked));
    }

    #[test]
    fn test_refund_requires_stake() {
        let mut p = LearningProgress::enroll(learner(), 3, "0", false, 1, 10).unwrap();
        p.complete_module(1, 11).unwrap();
        p.mark_course_completed(None, 12).unwrap();
        assert_eq!(p.mark_stake_returned(13), Err(ProgressError::NotStaked));
    }

    #[test]
    fn test_completion_reward_paid_once() {
        let mut p = enrolled(1);
        assert_eq!(
            p.claim_completion_reward(1),
            Err(ProgressError::CourseNotCompleted)
        );
        p.complete_module(1, 2).unwrap();
        p.mark_course_completed(None, 3).unwrap();

        p.claim_completion_reward(4).unwrap();
        assert_eq!(
            p.claim_completion_reward(5),
            Err(ProgressError::CompletionRewardClaimed)
        );
        p.release_completion_reward(6);
        p.claim_completion_reward(7).unwrap();
    }

    #[test]
    fn test_serde_round_trip_keeps_camel_case() {
        let p = enrolled(2);
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["completedModules"], 0);
        assert_eq!(json["modules"][1]["isLocked"], true);
        let back: LearningProgress = serde_json::from_value(json).unwrap();
        assert_eq!(back, p);
    }
}
