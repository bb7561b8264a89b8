mod trace;

pub(crate) use trace::trace_label_boundaries;
