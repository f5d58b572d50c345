// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::fmt;

pub mod codes {
    pub const ALREADY_EXISTS: &str = "already_exists";
    pub const BEING_DELETED: &str = "being_deleted";
    pub const NOT_FOUND: &str = "not_found";
    pub const DUPLICATE_CASE: &str = "duplicate_case";
    pub const BACKEND_FAULT: &str = "backend_fault";
    pub const TIMEOUT: &str = "timeout";
    pub const CANCELED: &str = "canceled";
    pub const INVALID_ARGUMENT: &str = "invalid_argument";
    pub const NO_CONTAINER_SESSION: &str = "no_container_session";
    pub const LOCAL_ERROR: &str = "local_error";
    pub const LEDGER_CORRUPT: &str = "ledger_corrupt";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppErrorKind {
    InvalidArgument,
    NotFound,
    Conflict,
    AlreadyExists,
    BeingDeleted,
    Timeout,
    Cancelled,
    Backend,
    Internal,
}

#[derive(Debug, Clone)]
pub struct AppError {
    kind: AppErrorKind,
    code: &'static str,
    message: String,
    context: Option<String>,
}

impl AppError {
    pub fn new(kind: AppErrorKind, code: &'static str) -> Self {
        Self {
            kind,
            code,
            message: code.to_string(),
            context: None,
        }
    }

    pub fn with_message(
        kind: AppErrorKind,
        code: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::with_message(AppErrorKind::AlreadyExists, codes::ALREADY_EXISTS, message)
    }

    pub fn being_deleted(message: impl Into<String>) -> Self {
        Self::with_message(AppErrorKind::BeingDeleted, codes::BEING_DELETED, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_message(AppErrorKind::NotFound, codes::NOT_FOUND, message)
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::with_message(AppErrorKind::Backend, codes::BACKEND_FAULT, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::with_message(
            AppErrorKind::InvalidArgument,
            codes::INVALID_ARGUMENT,
            message,
        )
    }

    pub fn local(message: impl Into<String>) -> Self {
        Self::with_message(AppErrorKind::Internal, codes::LOCAL_ERROR, message)
    }

    pub fn kind(&self) -> AppErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    pub fn is_already_exists(&self) -> bool {
        self.kind == AppErrorKind::AlreadyExists
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ctx) = &self.context {
            write!(f, "{} ({})", self.message, ctx)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;
