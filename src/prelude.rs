// Short names for the logging facade in `observability`.

#[allow(unused_imports)]
pub(crate) use crate::observability::{
    log_debug as debug, log_error as error, log_info as info, log_warn as warn,
};
