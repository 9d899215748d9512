use super::{Event, Opts};
use crate::ffi::{self, Attr};

pub(crate) fn from(event: Event, opts: &Opts) -> Attr {
    let mut attr = Attr {
        size: size_of::<Attr>() as _,
        ..Default::default()
    };

    // event config:

    attr.type_ = event.ty;
    attr.config = event.config;

    // count config:

    attr.read_format = opts.stat_format.as_read_format();
    attr.set(ffi::ATTR_DISABLED, !opts.enable);
    attr.set(ffi::ATTR_INHERIT, opts.inherit);

    // sample config:

    attr.sample_period = opts.sample_period;
    attr.sample_type = opts.sample_type;
    attr.set(ffi::ATTR_SAMPLE_ID_ALL, opts.sample_id_all);
    attr.set(ffi::ATTR_WRITE_BACKWARD, opts.overwrite);

    match opts.wakeup_watermark {
        Some(bytes) => {
            attr.set(ffi::ATTR_WATERMARK, true);
            attr.wakeup_events = bytes;
        }
        None => attr.wakeup_events = 1,
    }

    attr
}
