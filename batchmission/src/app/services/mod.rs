// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod case_paths;
pub mod fetch_filter;
pub mod ledger;
pub mod task_builder;
