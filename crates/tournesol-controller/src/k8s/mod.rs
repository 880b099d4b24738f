/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Kubernetes access: client construction and the diagnostic watch loop.

pub mod api;
pub mod watch;
