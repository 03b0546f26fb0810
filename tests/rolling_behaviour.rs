//! Behavioural coverage for windowed rolling replacement.

mod rolling;
