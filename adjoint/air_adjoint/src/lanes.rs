use air::builder::InstBuilder;
use air::cursor::FuncCursor;
use air::{Type, Value};

/// Applies `rule` once per derivative lane.
///
/// For a single lane `rule` receives `args` unchanged. Otherwise every argument is a
/// `[width x T]` shadow, `rule` is called with the `lane`th element of each argument and the
/// results are collected into a `[width x ret_ty]` aggregate. Rules that only emit side effects
/// pass `None` as `ret_ty` and return `None`.
pub fn for_each_lane<'f>(
    cursor: &mut FuncCursor<'f>,
    width: u32,
    args: &[Value],
    ret_ty: Option<Type>,
    mut rule: impl FnMut(&mut FuncCursor<'f>, u32, &[Value]) -> Option<Value>,
) -> Option<Value> {
    if width == 1 {
        return rule(cursor, 0, args);
    }

    let mut res = ret_ty.map(|ty| {
        let agg_ty = cursor.func.dfg.types.array(ty, width);
        cursor.func.dfg.undef(agg_ty)
    });
    let mut lane_args = Vec::with_capacity(args.len());
    for lane in 0..width {
        lane_args.clear();
        lane_args.extend(args.iter().map(|&arg| cursor.ins().extract_value(arg, lane)));
        let lane_res = rule(cursor, lane, &lane_args);
        if let Some(agg) = res {
            let lane_res = match lane_res {
                Some(lane_res) => lane_res,
                None => unreachable!("lane {lane} did not produce a result"),
            };
            res = Some(cursor.ins().insert_value(agg, lane_res, lane));
        }
    }
    res
}
