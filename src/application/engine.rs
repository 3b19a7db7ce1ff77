use super::enrollment::{EnrollmentOutcome, EnrollmentRequest, EnrollmentService};
use super::notifications::{DispatchStats, NotificationDispatcher};
use super::orchestrator::WorkflowOrchestrator;
use super::review::PaymentReviewService;
use crate::config::WorkflowConfig;
use crate::domain::payment::{Payment, PaymentId};
use crate::domain::ports::{SharedChat, SharedLedger, SharedMailer};
use crate::error::Result;
use std::sync::Arc;

/// Everything the workflow talks to, handed over at construction time.
pub struct WorkflowDeps {
    pub ledger: SharedLedger,
    pub mailer: SharedMailer,
    pub chat: SharedChat,
    pub config: WorkflowConfig,
}

/// One inbound workflow request.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowCommand {
    Enroll(EnrollmentRequest),
    Accept(PaymentId),
    Reject { payment: PaymentId, message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Enrollment(EnrollmentOutcome),
    Reviewed(Payment),
}

/// The entry point of the enrollment workflow.
///
/// `EnrollmentEngine` wires the orchestrator, both services and the
/// notification dispatcher together. It must be created inside a tokio
/// runtime because the dispatcher spawns its delivery task immediately.
pub struct EnrollmentEngine {
    enrollment: EnrollmentService,
    review: PaymentReviewService,
    ledger: SharedLedger,
    dispatcher: NotificationDispatcher,
}

impl EnrollmentEngine {
    pub fn new(deps: WorkflowDeps) -> Self {
        let WorkflowDeps {
            ledger,
            mailer,
            chat,
            config,
        } = deps;

        let dispatcher = NotificationDispatcher::spawn(mailer, chat, &config);
        let orchestrator = Arc::new(WorkflowOrchestrator::new(
            ledger.clone(),
            dispatcher.sender(),
            &config,
        ));

        Self {
            enrollment: EnrollmentService::new(orchestrator.clone()),
            review: PaymentReviewService::new(orchestrator, config.utc_offset),
            ledger,
            dispatcher,
        }
    }

    pub fn enrollment(&self) -> &EnrollmentService {
        &self.enrollment
    }

    pub fn review(&self) -> &PaymentReviewService {
        &self.review
    }

    pub fn ledger(&self) -> &SharedLedger {
        &self.ledger
    }

    pub fn notification_stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    pub async fn process(&self, command: WorkflowCommand) -> Result<CommandOutcome> {
        match command {
            WorkflowCommand::Enroll(request) => self
                .enrollment
                .request_enrollment(request)
                .await
                .map(CommandOutcome::Enrollment),
            WorkflowCommand::Accept(id) => self.review.accept(id).await.map(CommandOutcome::Reviewed),
            WorkflowCommand::Reject { payment, message } => self
                .review
                .reject(payment, message)
                .await
                .map(CommandOutcome::Reviewed),
        }
    }

    /// Delivers queued notifications and stops the dispatcher.
    pub async fn shutdown(self) -> DispatchStats {
        self.dispatcher.shutdown().await
    }
}
