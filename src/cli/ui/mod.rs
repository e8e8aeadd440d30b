mod inspect_view;
mod painter;
mod table;
mod value_view;

pub(crate) use self::inspect_view::DiscoveryReportView;
pub(crate) use self::painter::Painter;
pub(crate) use self::value_view::ValueReportView;
