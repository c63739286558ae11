//! Tests spanning configuration, stores and mappings together
