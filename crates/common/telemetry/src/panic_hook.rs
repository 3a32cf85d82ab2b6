// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Panic reporting through tracing.

use std::{any::Any, panic, thread};

use backtrace::Backtrace;

/// Installs a panic hook that emits one `tracing::error!` event per panic
/// before handing over to the previously installed hook.
///
/// The event carries `app`, the panicking thread's name, the source
/// location, the panic message and a resolved backtrace, so a panic in a
/// command that holds a queue file open still ends up in the log files.
pub fn set_panic_hook(app: &'static str) {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        let current = thread::current();
        let thread = current.name().unwrap_or("<unnamed>");
        let location = info.location().map_or_else(
            || "<unknown>".to_string(),
            |l| format!("{}:{}:{}", l.file(), l.line(), l.column()),
        );
        let backtrace = Backtrace::new();

        tracing::error!(
            app,
            thread,
            location = %location,
            panic.message = payload_message(info.payload()),
            backtrace = ?backtrace,
            "Panic"
        );
        previous(info);
    }));
}

/// Text of a panic payload. `panic!` produces either a `&str` or a
/// `String`.
fn payload_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}
