//! Per-user dialogue state.
//!
//! One independent slot map per flow kind. Nothing stops two maps from holding a
//! slot for the same user at once; routing stays unambiguous because the dispatcher
//! consults them in [`FlowKind::ROUTING_ORDER`] and stops at the first hit, and
//! flow entry points clear the other slots when they start.
//!
//! The maps assume a single writer per user at a time. [`UserGate`] enforces that
//! inside one process; running several instances requires moving these maps and the
//! gate into a shared store with per-key locking.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::UserId;
use crate::domain::ProfileField;
use crate::flows::meal::ManualAddState;
use crate::flows::plan::PlanState;
use crate::flows::registration::RegistrationState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowKind {
    Registration,
    ProfileEdit,
    ManualAdd,
    WorkoutPlan,
    NutritionPlan,
    WaterWait,
    StepsWait,
    MedicalWait,
    QuestionWait,
}

impl FlowKind {
    /// Order in which slots claim a free-text message.
    pub const ROUTING_ORDER: [FlowKind; 9] = [
        FlowKind::Registration,
        FlowKind::ProfileEdit,
        FlowKind::ManualAdd,
        FlowKind::WorkoutPlan,
        FlowKind::NutritionPlan,
        FlowKind::WaterWait,
        FlowKind::StepsWait,
        FlowKind::MedicalWait,
        FlowKind::QuestionWait,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FlowKind::Registration => "registration",
            FlowKind::ProfileEdit => "profile_edit",
            FlowKind::ManualAdd => "manual_add",
            FlowKind::WorkoutPlan => "workout_plan",
            FlowKind::NutritionPlan => "nutrition_plan",
            FlowKind::WaterWait => "water_wait",
            FlowKind::StepsWait => "steps_wait",
            FlowKind::MedicalWait => "medical_wait",
            FlowKind::QuestionWait => "question_wait",
        }
    }
}

/// Slots of one flow kind, keyed by user.
pub struct SlotMap<T> {
    slots: RwLock<HashMap<UserId, T>>,
}

impl<T: Clone> SlotMap<T> {
    pub async fn get(&self, user_id: UserId) -> Option<T> {
        self.slots.read().await.get(&user_id).cloned()
    }

    pub async fn set(&self, user_id: UserId, slot: T) {
        self.slots.write().await.insert(user_id, slot);
    }

    pub async fn clear(&self, user_id: UserId) -> Option<T> {
        self.slots.write().await.remove(&user_id)
    }

    pub async fn contains(&self, user_id: UserId) -> bool {
        self.slots.read().await.contains_key(&user_id)
    }

    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }
}

impl<T> Default for SlotMap<T> {
    fn default() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }
}

#[derive(Default)]
pub struct SessionStore {
    pub registration: SlotMap<RegistrationState>,
    pub profile_edit: SlotMap<ProfileField>,
    pub manual_add: SlotMap<ManualAddState>,
    pub workout_plan: SlotMap<PlanState>,
    pub nutrition_plan: SlotMap<PlanState>,
    pub water_wait: SlotMap<()>,
    pub steps_wait: SlotMap<()>,
    pub medical_wait: SlotMap<()>,
    pub question_wait: SlotMap<()>,
}

impl SessionStore {
    pub async fn has_slot(&self, user_id: UserId, kind: FlowKind) -> bool {
        match kind {
            FlowKind::Registration => self.registration.contains(user_id).await,
            FlowKind::ProfileEdit => self.profile_edit.contains(user_id).await,
            FlowKind::ManualAdd => self.manual_add.contains(user_id).await,
            FlowKind::WorkoutPlan => self.workout_plan.contains(user_id).await,
            FlowKind::NutritionPlan => self.nutrition_plan.contains(user_id).await,
            FlowKind::WaterWait => self.water_wait.contains(user_id).await,
            FlowKind::StepsWait => self.steps_wait.contains(user_id).await,
            FlowKind::MedicalWait => self.medical_wait.contains(user_id).await,
            FlowKind::QuestionWait => self.question_wait.contains(user_id).await,
        }
    }

    pub async fn clear(&self, user_id: UserId, kind: FlowKind) {
        match kind {
            FlowKind::Registration => {
                self.registration.clear(user_id).await;
            }
            FlowKind::ProfileEdit => {
                self.profile_edit.clear(user_id).await;
            }
            FlowKind::ManualAdd => {
                self.manual_add.clear(user_id).await;
            }
            FlowKind::WorkoutPlan => {
                self.workout_plan.clear(user_id).await;
            }
            FlowKind::NutritionPlan => {
                self.nutrition_plan.clear(user_id).await;
            }
            FlowKind::WaterWait => {
                self.water_wait.clear(user_id).await;
            }
            FlowKind::StepsWait => {
                self.steps_wait.clear(user_id).await;
            }
            FlowKind::MedicalWait => {
                self.medical_wait.clear(user_id).await;
            }
            FlowKind::QuestionWait => {
                self.question_wait.clear(user_id).await;
            }
        }
    }

    /// First flow in routing order holding a slot for this user.
    pub async fn active_flow(&self, user_id: UserId) -> Option<FlowKind> {
        for kind in FlowKind::ROUTING_ORDER {
            if self.has_slot(user_id, kind).await {
                return Some(kind);
            }
        }
        None
    }

    pub async fn clear_all(&self, user_id: UserId) {
        for kind in FlowKind::ROUTING_ORDER {
            self.clear(user_id, kind).await;
        }
    }

    /// Clear every slot except `keep`. Called when a flow starts so it supersedes
    /// whatever the user was doing before.
    pub async fn clear_except(&self, user_id: UserId, keep: FlowKind) {
        for kind in FlowKind::ROUTING_ORDER {
            if kind != keep {
                self.clear(user_id, kind).await;
            }
        }
    }
}

/// Serializes event handling per user: one in-flight event per user, later events
/// wait for their turn. Events of different users never wait on each other.
#[derive(Default)]
pub struct UserGate {
    locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl UserGate {
    pub async fn acquire(&self, user_id: UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(user_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Forget locks nobody holds or waits for. Returns how many were dropped.
    pub async fn sweep(&self) -> usize {
        let mut locks = self.locks.lock().await;
        let before = locks.len();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - locks.len()
    }
}
