//! Startup-time heap configuration. Every option can be set through a
//! `SLIDEGC_`-prefixed environment variable (e.g. `SLIDEGC_SLIDING_GC=true`)
//! or through [`Options::set_from_command_line`] before the heap is built;
//! the heap reads the values once at initialization.

use crate::util::constants::*;

fn always_valid<T>(_: &T) -> bool {
    true
}

/// A single typed heap option.
#[derive(Debug, Clone)]
pub struct HeapOption<T: Clone> {
    pub value: T,
}

// Dereference an option to get its value.
impl<T: Clone> std::ops::Deref for HeapOption<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

macro_rules! options {
    ($($(#[$outer:meta])* $name:ident: $type:ty [$validator:expr] = $default:expr),* $(,)?) => [
        pub struct Options {
            $($(#[$outer])* pub $name: HeapOption<$type>),*
        }
        impl Options {
            /// Set an option from a command-line style key/value pair.
            /// Returns true if the key exists and the value is valid.
            pub fn set_from_command_line(&mut self, s: &str, val: &str) -> bool {
                self.set_inner(s, val)
            }

            /// Set an option and run its validator on the value.
            fn set_inner(&mut self, s: &str, val: &str) -> bool {
                match s {
                    $(stringify!($name) => if let Ok(ref val) = val.parse::<$type>() {
                        let validate_fn: fn(&$type) -> bool = $validator;
                        let is_valid = validate_fn(val);
                        if is_valid {
                            self.$name.value = val.clone();
                        } else {
                            eprintln!("Warn: unable to set {}={:?}. Invalid value. Default value will be used.", s, val);
                        }
                        is_valid
                    } else {
                        eprintln!("Warn: unable to set {}={:?}. Cant parse value. Default value will be used.", s, val);
                        false
                    })*
                    _ => panic!("Invalid Options key: {}", s)
                }
            }
        }
        impl Default for Options {
            fn default() -> Self {
                let mut options = Options {
                    $($name: HeapOption { value: $default }),*
                };

                // Environment variables that start with SLIDEGC_ and match an
                // option name (such as SLIDEGC_MAX_TLAB_SIZE) override the
                // defaults.
                const PREFIX: &str = "SLIDEGC_";
                for (key, val) in std::env::vars() {
                    if let Some(rest_of_key) = key.strip_prefix(PREFIX) {
                        let lowercase: &str = &rest_of_key.to_lowercase();
                        match lowercase {
                            $(stringify!($name) => { options.set_inner(lowercase, &val); },)*
                            _ => {}
                        }
                    }
                }
                options
            }
        }
    ]
}

options! {
    /// Initial committed heap size in bytes.
    heap_size:            usize [|v: &usize| *v > 0] = 256 << LOG_BYTES_IN_MBYTE,
    /// Maximum (reserved) heap size in bytes. Zero means "same as the
    /// initial size": the heap never expands.
    max_heap_size:        usize [always_valid] = 0,
    /// Enable the sliding mark-compact collector. Off by default: the heap
    /// only bump-allocates and never reclaims.
    sliding_gc:           bool  [always_valid] = false,
    /// Use elastic per-thread TLAB sizing.
    elastic_tlab:         bool  [always_valid] = true,
    /// Decay the elastic TLAB size of threads that stopped allocating.
    elastic_tlab_decay:   bool  [always_valid] = true,
    /// Multiplier applied to the ergonomic TLAB size when a request does
    /// not fit it.
    tlab_elasticity:      f64   [|v: &f64| *v >= 1.0] = 1.1,
    /// Idle time in milliseconds after which a thread's ergonomic TLAB
    /// size is retracted.
    tlab_decay_time:      u64   [always_valid] = 1000,
    /// Upper bound for a single TLAB, in bytes.
    max_tlab_size:        usize [|v: &usize| *v >= BYTES_IN_WORD] = 4 << LOG_BYTES_IN_MBYTE,
    /// Smallest chunk by which the committed space grows, in bytes.
    min_heap_expand:      usize [|v: &usize| *v > 0] = 128 << LOG_BYTES_IN_MBYTE,
    /// Bytes of allocation between monitoring counter updates. Clamped at
    /// initialization to 1/16th of the maximum heap size.
    update_counters_step: usize [|v: &usize| *v > 0] = 1 << LOG_BYTES_IN_MBYTE,
    /// Number of heap occupancy report lines across the whole heap. Zero
    /// disables occupancy reporting.
    print_heap_steps:     usize [always_valid] = 20,
    /// Re-mark and cross-check the heap after every collection cycle.
    verify:               bool  [always_valid] = false,
    /// Uncommit memory freed by compaction back to the OS.
    uncommit:             bool  [always_valid] = false,
    /// Run a collection (when the sliding collector is enabled) before
    /// reporting an allocation failure upward.
    implicit_gc:          bool  [always_valid] = true,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test_util::serial_test;

    #[test]
    fn test_set_valid() {
        serial_test(|| {
            let mut options = Options::default();
            let success = options.set_from_command_line("max_tlab_size", "65536");
            assert!(success);
            assert_eq!(*options.max_tlab_size, 65536);
        })
    }

    #[test]
    fn test_set_invalid_value() {
        serial_test(|| {
            let mut options = Options::default();
            let default_elasticity = *options.tlab_elasticity;
            let success = options.set_from_command_line("tlab_elasticity", "0.5");
            assert!(!success);
            assert_eq!(*options.tlab_elasticity, default_elasticity);
        })
    }

    #[test]
    fn test_set_unparsable_value() {
        serial_test(|| {
            let mut options = Options::default();
            let success = options.set_from_command_line("heap_size", "a lot");
            assert!(!success);
        })
    }

    #[test]
    fn test_env_var_override() {
        serial_test(|| {
            std::env::set_var("SLIDEGC_SLIDING_GC", "true");
            let options = Options::default();
            std::env::remove_var("SLIDEGC_SLIDING_GC");
            assert!(*options.sliding_gc);
        })
    }
}
